//! Error types for k2s

use thiserror::Error;

/// Link printed when conda cannot tell us which environment is active.
pub const SUPPORT_URL: &str = "https://ploomber.io/community";

#[derive(Error, Debug)]
pub enum K2sError {
    #[error("Only Linux and Mac are supported (got platform '{platform}', arch '{arch}')")]
    UnsupportedPlatform { platform: String, arch: String },

    #[error("conda is not installed, to install it drop --no-install-conda (or set install_conda: true in the config)")]
    MissingConda,

    #[error("Command `{command}` failed with exit code {}{}", exit_code(code), stderr_suffix(stderr))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("Unable to determine current environment. For help: {}", SUPPORT_URL)]
    UnknownActiveEnvironment,

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("'{0}' is not supported yet")]
    Unsupported(&'static str),

    #[error("Task error: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{}", trimmed)
    }
}

pub type Result<T> = std::result::Result<T, K2sError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message_includes_stderr() {
        let err = K2sError::CommandFailed {
            command: "mamba env update".to_string(),
            code: Some(1),
            stderr: "  solver exploded \n".to_string(),
        };

        let message = err.to_string();
        assert!(message.contains("mamba env update"));
        assert!(message.contains("exit code 1"));
        assert!(message.ends_with("solver exploded"));
    }

    #[test]
    fn test_command_failed_without_code_or_stderr() {
        let err = K2sError::CommandFailed {
            command: "conda info --json".to_string(),
            code: None,
            stderr: String::new(),
        };

        assert_eq!(
            err.to_string(),
            "Command `conda info --json` failed with exit code unknown"
        );
    }

    #[test]
    fn test_unknown_active_environment_has_support_link() {
        let message = K2sError::UnknownActiveEnvironment.to_string();
        assert!(message.contains(SUPPORT_URL));
    }
}

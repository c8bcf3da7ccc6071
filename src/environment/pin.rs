//! Version Pin Record
//!
//! Conda reads `<prefix>/conda-meta/pinned` before every solve and refuses
//! to move the listed packages. Pinning the interpreter keeps
//! `env update` from swapping Python under an existing environment.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{K2sError, Result};

/// Snippet run with the environment's interpreter to report its version.
pub const PYTHON_VERSION_SCRIPT: &str =
    "from sys import version_info as v; print(f'{v.major}.{v.minor}.{v.micro}')";

/// The `pinned` file of one environment prefix.
#[derive(Debug, Clone)]
pub struct PinFile {
    path: PathBuf,
}

impl PinFile {
    pub fn for_prefix(prefix: &Path) -> Self {
        Self {
            path: prefix.join("conda-meta").join("pinned"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `spec` as its own line, creating `conda-meta/` if needed.
    pub fn append(&self, spec: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let needs_newline = fs::read(&self.path)
            .map(|existing| !existing.is_empty() && !existing.ends_with(b"\n"))
            .unwrap_or(false);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if needs_newline {
            writeln!(file)?;
        }
        writeln!(file, "{}", spec)?;

        info!("Pinned {} in {}", spec, self.path.display());
        Ok(())
    }

    /// Non-empty lines of the file; empty when it does not exist.
    pub fn entries(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        Ok(fs::read_to_string(&self.path)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Validates a `major.minor.micro` string as printed by `PYTHON_VERSION_SCRIPT`.
pub fn parse_python_version(output: &str) -> Result<String> {
    let version = output.trim();
    let parts: Vec<&str> = version.split('.').collect();

    let valid = parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));

    if valid {
        Ok(version.to_string())
    } else {
        Err(K2sError::InvalidVersion(format!(
            "unexpected interpreter version output: {:?}",
            output
        )))
    }
}

/// Formats the pin line for an exact interpreter version.
pub fn python_pin(version: &str) -> String {
    format!("python=={}", version)
}

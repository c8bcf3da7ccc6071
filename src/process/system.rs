//! Real process, network and PATH access.

use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};

use super::{CommandOutput, CommandSpec, OutputMode, Toolbox};
use crate::error::{K2sError, Result};

/// [`Toolbox`] backed by `std::process`, `ureq` and the PATH variable.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemToolbox;

impl SystemToolbox {
    pub fn new() -> Self {
        Self
    }
}

impl Toolbox for SystemToolbox {
    fn execute(&self, command: &CommandSpec, mode: OutputMode) -> Result<CommandOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
            debug!("Executing in directory: {}", dir.display());
        }

        let spawn_error = |source| K2sError::Spawn {
            program: command.program.display().to_string(),
            source,
        };

        match mode {
            OutputMode::Inherit => {
                let status = cmd
                    .stdin(Stdio::null())
                    .status()
                    .map_err(spawn_error)?;
                Ok(CommandOutput {
                    code: status.code(),
                    ..CommandOutput::default()
                })
            }
            OutputMode::Capture => {
                let output = cmd.stdin(Stdio::null()).output().map_err(spawn_error)?;
                Ok(CommandOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        }
    }

    fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        info!("Downloading {}", url);

        let response = ureq::get(url).call().map_err(|e| K2sError::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut reader = response.into_reader();
        let mut file = File::create(destination)?;
        let bytes = io::copy(&mut reader, &mut file)?;

        debug!("Saved {} bytes to {}", bytes, destination.display());
        Ok(())
    }

    fn which(&self, binary: &str) -> Option<PathBuf> {
        let path_var = env::var_os("PATH")?;
        env::split_paths(&path_var)
            .map(|dir| dir.join(binary))
            .find(|candidate| is_executable(candidate))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

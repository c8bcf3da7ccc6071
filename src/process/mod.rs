//! Host Capabilities
//!
//! Everything k2s does to the outside world goes through the [`Toolbox`]
//! trait: running a program, downloading a URL and locating a binary on
//! the PATH. The real implementation lives in [`system`]; tests swap in a
//! recording fake so no process is spawned and no network is touched.

pub mod system;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::error::{K2sError, Result};

pub use system::SystemToolbox;

/// A program invocation, built up before it is handed to a [`Toolbox`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    /// Path arguments are common enough to deserve their own helper.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Whether the child's stdout/stderr go to the terminal or back to us.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Inherit,
    Capture,
}

/// Exit status and (when captured) output of a finished command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run-command / fetch-url / locate-binary capabilities.
pub trait Toolbox: Send + Sync {
    /// Runs a command to completion. A non-zero exit is reported through
    /// [`CommandOutput::code`], not as an error; only failing to start the
    /// program is an error here.
    fn execute(&self, command: &CommandSpec, mode: OutputMode) -> Result<CommandOutput>;

    /// Downloads `url` into `destination`, overwriting it.
    fn fetch(&self, url: &str, destination: &Path) -> Result<()>;

    /// Finds an executable on the PATH.
    fn which(&self, binary: &str) -> Option<PathBuf>;
}

/// Runs a command with inherited stdio, failing on a non-zero exit.
pub fn run_checked(toolbox: &dyn Toolbox, command: &CommandSpec) -> Result<()> {
    debug!("Running: {}", command);
    let output = toolbox.execute(command, OutputMode::Inherit)?;
    ensure_success(command, output).map(|_| ())
}

/// Runs a command and returns its stdout, failing on a non-zero exit.
pub fn capture_stdout(toolbox: &dyn Toolbox, command: &CommandSpec) -> Result<String> {
    debug!("Running (captured): {}", command);
    let output = toolbox.execute(command, OutputMode::Capture)?;
    ensure_success(command, output).map(|output| output.stdout)
}

fn ensure_success(command: &CommandSpec, output: CommandOutput) -> Result<CommandOutput> {
    if output.is_success() {
        return Ok(output);
    }

    error!(
        "Command failed with exit code {:?}: {}",
        output.code, command
    );

    Err(K2sError::CommandFailed {
        command: command.to_string(),
        code: output.code,
        stderr: output.stderr,
    })
}

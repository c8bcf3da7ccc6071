//! Recording [`Toolbox`] for unit tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{CommandOutput, CommandSpec, OutputMode, Toolbox};
use crate::error::Result;

/// Records every call and answers from canned responses.
///
/// Responses are matched by substring against the rendered command line;
/// the first match wins and unmatched commands succeed with empty output.
/// Hooks registered with [`on`](Self::on) run for every matching command
/// before the response is returned.
#[derive(Default)]
pub(crate) struct RecordingToolbox {
    calls: Mutex<Vec<CommandSpec>>,
    fetches: Mutex<Vec<(String, PathBuf)>>,
    responses: Vec<(String, CommandOutput)>,
    hooks: Vec<(String, Hook)>,
    binaries: HashMap<String, PathBuf>,
}

type Hook = Box<dyn Fn(&CommandSpec) + Send + Sync>;

impl RecordingToolbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_binary(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.binaries.insert(name.to_string(), path.into());
        self
    }

    pub(crate) fn respond(mut self, needle: &str, stdout: &str) -> Self {
        self.responses
            .push((needle.to_string(), CommandOutput::success(stdout)));
        self
    }

    pub(crate) fn fail(mut self, needle: &str, code: i32, stderr: &str) -> Self {
        self.responses.push((
            needle.to_string(),
            CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    /// Runs `hook` whenever a command line containing `needle` executes,
    /// standing in for side effects of the real program (build artifacts).
    pub(crate) fn on(
        mut self,
        needle: &str,
        hook: impl Fn(&CommandSpec) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.push((needle.to_string(), Box::new(hook)));
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    pub(crate) fn calls_matching(&self, needle: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|cmd| cmd.to_string().contains(needle))
            .collect()
    }

    pub(crate) fn fetches(&self) -> Vec<(String, PathBuf)> {
        self.fetches.lock().unwrap().clone()
    }
}

impl Toolbox for RecordingToolbox {
    fn execute(&self, command: &CommandSpec, _mode: OutputMode) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());

        let line = command.to_string();
        for (needle, hook) in &self.hooks {
            if line.contains(needle.as_str()) {
                hook(command);
            }
        }

        let output = self
            .responses
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::success(""));

        Ok(output)
    }

    fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        self.fetches
            .lock()
            .unwrap()
            .push((url.to_string(), destination.to_path_buf()));
        fs::write(destination, "#!/bin/bash\n")?;
        Ok(())
    }

    fn which(&self, binary: &str) -> Option<PathBuf> {
        self.binaries.get(binary).cloned()
    }
}

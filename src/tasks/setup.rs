//! Development Environment Setup
//!
//! Creates conda environments for working on k2s itself: one with the
//! package installed in editable mode, and a clean one with only
//! JupyterLab for manual testing.

use std::path::Path;

use log::info;

use crate::error::Result;
use crate::process::{run_checked, CommandSpec, Toolbox};

/// Python used by `setup` when none is given.
pub const DEFAULT_DEV_PYTHON: &str = "3.9";

/// Python used by `setup-jupyter` when none is given.
pub const DEFAULT_JUPYTER_PYTHON: &str = "3.8";

/// Name of the throwaway notebook environment.
pub const JUPYTER_ENV_NAME: &str = "k2s-jupyter";

/// Dev environment name: `k2s` for the default Python, otherwise suffixed
/// with the version digits (`3.10` → `k2s310`).
pub fn dev_env_name(python: &str) -> String {
    if python == DEFAULT_DEV_PYTHON {
        "k2s".to_string()
    } else {
        format!("k2s{}", python.replace('.', ""))
    }
}

/// Creates the dev environment and installs the project in editable mode.
/// Returns the environment name.
pub fn setup(toolbox: &dyn Toolbox, project_root: &Path, python: Option<&str>) -> Result<String> {
    let python = python.unwrap_or(DEFAULT_DEV_PYTHON);
    let env_name = dev_env_name(python);

    create_with_pip_install(toolbox, &env_name, python, "--editable .[dev]", project_root)?;
    Ok(env_name)
}

/// Creates a clean environment with only JupyterLab. Returns its name.
pub fn setup_jupyter(
    toolbox: &dyn Toolbox,
    project_root: &Path,
    python: Option<&str>,
) -> Result<String> {
    let python = python.unwrap_or(DEFAULT_JUPYTER_PYTHON);

    create_with_pip_install(toolbox, JUPYTER_ENV_NAME, python, "jupyterlab", project_root)?;
    Ok(JUPYTER_ENV_NAME.to_string())
}

/// Message shown once an environment is ready.
pub fn activation_hint(env_name: &str) -> String {
    format!(
        "Done! Activate your environment with:\nconda activate {}",
        env_name
    )
}

fn create_with_pip_install(
    toolbox: &dyn Toolbox,
    env_name: &str,
    python: &str,
    pip_args: &str,
    project_root: &Path,
) -> Result<()> {
    info!("Creating environment '{}' with python={}", env_name, python);

    let create = CommandSpec::new("conda")
        .args(["create", "--name", env_name])
        .arg(format!("python={}", python))
        .arg("--yes")
        .working_dir(project_root);
    run_checked(toolbox, &create)?;

    // pip has to run inside the activated environment
    let script = format!(
        "eval \"$(conda shell.bash hook)\" && conda activate {} && pip install {}",
        env_name, pip_args
    );
    let install = CommandSpec::new("bash")
        .arg("-c")
        .arg(script)
        .working_dir(project_root);
    run_checked(toolbox, &install)
}

//! Package Upload
//!
//! Builds the distribution for a release tag and uploads it with `twine`,
//! either to PyPI or to the TestPyPI index.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{K2sError, Result};
use crate::process::{capture_stdout, run_checked, CommandSpec, Toolbox};

/// `twine` repository name of the test index.
pub const TEST_REPOSITORY: &str = "testpypi";

/// Checks out `tag`, builds it and uploads the artifacts. The branch that
/// was checked out before is restored even when the build or upload fails.
pub fn release(toolbox: &dyn Toolbox, project_root: &Path, tag: &str, production: bool) -> Result<()> {
    let branch = current_checkout(toolbox, project_root)?;

    info!("Releasing {} (returning to '{}' afterwards)", tag, branch);
    run_checked(toolbox, &git(project_root, &["checkout", tag]))?;

    let result = build_and_upload(toolbox, project_root, production);

    if let Err(e) = run_checked(toolbox, &git(project_root, &["checkout", branch.as_str()])) {
        warn!("Could not check out '{}' again: {}", branch, e);
    }

    result
}

/// Name of the checked-out branch, or the commit SHA on a detached HEAD.
fn current_checkout(toolbox: &dyn Toolbox, project_root: &Path) -> Result<String> {
    let branch = capture_stdout(
        toolbox,
        &git(project_root, &["rev-parse", "--abbrev-ref", "HEAD"]),
    )?
    .trim()
    .to_string();

    if branch != "HEAD" {
        return Ok(branch);
    }

    let sha = capture_stdout(toolbox, &git(project_root, &["rev-parse", "HEAD"]))?
        .trim()
        .to_string();
    debug!("Detached HEAD at {}", sha);
    Ok(sha)
}

fn build_and_upload(toolbox: &dyn Toolbox, project_root: &Path, production: bool) -> Result<()> {
    let dist = project_root.join("dist");
    if dist.exists() {
        fs::remove_dir_all(&dist)?;
    }

    let build = CommandSpec::new("python")
        .args(["-m", "build"])
        .working_dir(project_root);
    run_checked(toolbox, &build)?;

    let artifacts = list_artifacts(&dist)?;
    if artifacts.is_empty() {
        return Err(K2sError::Task(format!(
            "build produced no artifacts in {}",
            dist.display()
        )));
    }

    let upload = upload_command(&artifacts, production).working_dir(project_root);
    run_checked(toolbox, &upload)?;

    info!(
        "Uploaded {} artifact(s) to {}",
        artifacts.len(),
        if production { "PyPI" } else { TEST_REPOSITORY }
    );
    Ok(())
}

/// `twine upload` for the given files, against TestPyPI unless
/// `production` is set.
pub fn upload_command(artifacts: &[PathBuf], production: bool) -> CommandSpec {
    let mut upload = CommandSpec::new("twine").arg("upload");
    if !production {
        upload = upload.args(["--repository", TEST_REPOSITORY]);
    }
    for artifact in artifacts {
        upload = upload.path_arg(artifact);
    }
    upload
}

fn list_artifacts(dist: &Path) -> Result<Vec<PathBuf>> {
    if !dist.is_dir() {
        return Ok(Vec::new());
    }

    let mut artifacts: Vec<PathBuf> = fs::read_dir(dist)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .collect();
    artifacts.sort();
    Ok(artifacts)
}

fn git(project_root: &Path, args: &[&str]) -> CommandSpec {
    CommandSpec::new("git")
        .args(args.iter().copied())
        .working_dir(project_root)
}

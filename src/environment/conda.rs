//! Conda/Mamba Environment Management
//!
//! Provides [`CondaManager`], which makes sure a conda installation and
//! `mamba` are available and creates or updates environments from an
//! [`EnvSpec`].
//!
//! # Base Prefix Resolution
//!
//! The conda used for every command is resolved as follows:
//! 1. `install_conda` on: the private installation at `<home>/conda`
//!    (installed on first use)
//! 2. `install_conda` off: the conda found on the PATH, whose prefix is
//!    two levels above the binary (`<prefix>/bin/conda`)

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use serde::Deserialize;

use super::installer::install_miniconda;
use super::pin::{parse_python_version, python_pin, PinFile, PYTHON_VERSION_SCRIPT};
use super::spec::EnvSpec;
use crate::config::Settings;
use crate::error::{K2sError, Result};
use crate::process::{capture_stdout, run_checked, CommandSpec, SystemToolbox, Toolbox};

/// Channel `mamba` itself is installed from.
const MAMBA_CHANNEL: &str = "conda-forge";

/// Active prefix inside Kaggle containers, where `conda info` reports an
/// empty one.
pub const NOTEBOOK_PLATFORM_PREFIX: &str = "/opt/conda";

/// A conda installation that commands are run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub prefix: PathBuf,
    /// The installation lives under the private home rather than being
    /// the user's own conda
    pub locally_installed: bool,
}

/// Subset of `conda info --json`.
#[derive(Deserialize, Debug, Default)]
struct CondaInfo {
    #[serde(default)]
    active_prefix: Option<String>,
}

/// Manages the base installation and the environments created from it.
pub struct CondaManager {
    settings: Settings,
    toolbox: Arc<dyn Toolbox>,
}

impl CondaManager {
    /// Creates a manager. Nothing is checked or installed until
    /// [`CondaManager::bootstrap`] (or one of its steps) is called.
    pub fn new(settings: Settings, toolbox: Arc<dyn Toolbox>) -> Self {
        Self { settings, toolbox }
    }

    /// Creates a manager that spawns real processes.
    pub fn with_system_toolbox(settings: Settings) -> Self {
        Self::new(settings, Arc::new(SystemToolbox::new()))
    }

    /// Returns the private home, creating it if missing.
    pub fn home(&self) -> Result<PathBuf> {
        let home = self.settings.home.clone();
        if !home.exists() {
            fs::create_dir_all(&home)?;
            debug!("Created home directory: {}", home.display());
        }
        Ok(home)
    }

    /// Ensures conda is installed and `mamba` is present in its base
    /// prefix.
    pub fn bootstrap(&self) -> Result<Installation> {
        let installation = self.ensure_base_installation()?;
        self.ensure_fast_resolver()?;
        Ok(installation)
    }

    /// Makes sure a conda installation is available.
    ///
    /// Installs Miniconda into `<home>/conda` when conda is missing from
    /// the PATH, or when `install_conda` is set, unless that directory
    /// already exists.
    pub fn ensure_base_installation(&self) -> Result<Installation> {
        let system_conda = self.toolbox.which("conda");
        let install_conda = self.settings.install_conda;

        if system_conda.is_none() && !install_conda {
            return Err(K2sError::MissingConda);
        }

        let home = self.home()?;
        let local = self.settings.local_conda_dir();

        if local.is_dir() {
            debug!("Found local conda at {}", local.display());
        } else if system_conda.is_none() || install_conda {
            info!("Installing conda (only needed once)...");
            install_miniconda(self.toolbox.as_ref(), &home.join("miniconda.sh"), &local)?;
            info!("Finished installing conda.");
        }

        let prefix = self.base_prefix()?;
        Ok(Installation {
            locally_installed: prefix == local,
            prefix,
        })
    }

    /// Installs `mamba` into the base prefix unless it is already there.
    pub fn ensure_fast_resolver(&self) -> Result<()> {
        let base = self.base_prefix()?;

        if base.join("bin").join("mamba").exists() {
            debug!("mamba already installed in {}", base.display());
            return Ok(());
        }

        info!("Installing mamba...");
        let cmd = CommandSpec::new(self.base_conda_bin()?)
            .args(["install", "mamba", "-c", MAMBA_CHANNEL, "-y", "--prefix"])
            .path_arg(&base);
        run_checked(self.toolbox.as_ref(), &cmd)?;
        info!("Done installing mamba.");

        Ok(())
    }

    /// Creates or updates an environment and returns its prefix.
    ///
    /// With `name` set the environment lives at `<base>/envs/<name>`;
    /// without it the currently active environment is updated in place.
    /// When the prefix already exists its Python version is pinned first,
    /// otherwise the solver may decide to reinstall Python and break the
    /// environment.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use k2s::config::Settings;
    /// use k2s::environment::CondaManager;
    ///
    /// fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let manager = CondaManager::with_system_toolbox(Settings::default());
    ///     manager.bootstrap()?;
    ///     let prefix = manager.create_env(Some("some-env"), &["python=3.8.13".to_string()], None)?;
    ///     println!("{}", prefix.display());
    ///     Ok(())
    /// }
    /// ```
    pub fn create_env(
        &self,
        name: Option<&str>,
        requirements: &[String],
        requirements_pip: Option<&[String]>,
    ) -> Result<PathBuf> {
        let spec = EnvSpec::new(name, requirements, requirements_pip);
        let spec_file = self.settings.spec_file();
        spec.write(&spec_file)?;

        let prefix = self.env_prefix(name)?;

        if prefix.exists() {
            info!("Updating dependencies in {}...", prefix.display());
            self.pin_python(&prefix)?;
        } else {
            info!("Installing dependencies into {}...", prefix.display());
        }

        let cmd = CommandSpec::new(self.base_mamba_bin()?)
            .args(["env", "update", "--file"])
            .path_arg(&spec_file)
            .arg("--prefix")
            .path_arg(&prefix)
            .arg("--prune");
        run_checked(self.toolbox.as_ref(), &cmd)?;

        info!("Done installing dependencies.");
        Ok(prefix)
    }

    /// Prefix of a named environment, or of the active one.
    pub fn env_prefix(&self, name: Option<&str>) -> Result<PathBuf> {
        match name {
            Some(name) => Ok(self.base_prefix()?.join("envs").join(name)),
            None => self.active_prefix(),
        }
    }

    /// Prefix of the currently active environment.
    pub fn active_prefix(&self) -> Result<PathBuf> {
        if self.settings.notebook_platform {
            debug!("Notebook platform detected, using {}", NOTEBOOK_PLATFORM_PREFIX);
            return Ok(PathBuf::from(NOTEBOOK_PLATFORM_PREFIX));
        }

        let cmd = CommandSpec::new(self.base_conda_bin()?).args(["info", "--json"]);
        let stdout = capture_stdout(self.toolbox.as_ref(), &cmd)?;
        let info: CondaInfo = serde_json::from_str(&stdout)?;

        match info.active_prefix {
            Some(prefix) if !prefix.trim().is_empty() => Ok(PathBuf::from(prefix)),
            _ => Err(K2sError::UnknownActiveEnvironment),
        }
    }

    /// Exact `major.minor.micro` version of the interpreter in `prefix`.
    pub fn python_version(&self, prefix: &Path) -> Result<String> {
        let cmd = CommandSpec::new(prefix.join("bin").join("python"))
            .arg("-c")
            .arg(PYTHON_VERSION_SCRIPT);
        let stdout = capture_stdout(self.toolbox.as_ref(), &cmd)?;
        parse_python_version(&stdout)
    }

    fn pin_python(&self, prefix: &Path) -> Result<()> {
        let version = self.python_version(prefix)?;
        PinFile::for_prefix(prefix).append(&python_pin(&version))
    }

    /// Base prefix every conda/mamba command runs from.
    pub fn base_prefix(&self) -> Result<PathBuf> {
        if self.settings.install_conda {
            return Ok(self.settings.local_conda_dir());
        }

        let conda = self.toolbox.which("conda").ok_or(K2sError::MissingConda)?;
        conda
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .ok_or(K2sError::MissingConda)
    }

    pub fn base_conda_bin(&self) -> Result<PathBuf> {
        Ok(self.base_prefix()?.join("bin").join("conda"))
    }

    pub fn base_mamba_bin(&self) -> Result<PathBuf> {
        Ok(self.base_prefix()?.join("bin").join("mamba"))
    }

    /// Deleting every environment, kernel and the local installation is
    /// not supported yet; nothing is touched.
    pub fn prune(&self) -> Result<()> {
        Err(K2sError::Unsupported("prune"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::RecordingToolbox;
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        home: TempDir,
        work: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                home: tempdir().unwrap(),
                work: tempdir().unwrap(),
            }
        }

        fn settings(&self) -> Settings {
            Settings::with_dirs(self.home.path(), self.work.path())
        }

        fn manager(&self, toolbox: &Arc<RecordingToolbox>) -> CondaManager {
            self.manager_with(self.settings(), toolbox)
        }

        fn manager_with(&self, settings: Settings, toolbox: &Arc<RecordingToolbox>) -> CondaManager {
            CondaManager::new(settings, toolbox.clone())
        }

        fn local_conda(&self) -> PathBuf {
            self.home.path().join("conda")
        }

        fn make_local_conda(&self) {
            fs::create_dir_all(self.local_conda().join("bin")).unwrap();
        }
    }

    fn reqs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_existing_local_install_skips_download() {
        let fx = Fixture::new();
        fx.make_local_conda();

        for install_conda in [true, false] {
            let toolbox = Arc::new(
                RecordingToolbox::new().with_binary("conda", "/usr/local/miniconda/bin/conda"),
            );
            let mut settings = fx.settings();
            settings.install_conda = install_conda;

            fx.manager_with(settings, &toolbox)
                .ensure_base_installation()
                .unwrap();

            assert!(toolbox.fetches().is_empty());
            assert!(toolbox.calls().is_empty());
        }
    }

    #[test]
    fn test_missing_conda_without_self_install() {
        let fx = Fixture::new();
        let toolbox = Arc::new(RecordingToolbox::new());
        let mut settings = fx.settings();
        settings.install_conda = false;

        let result = fx.manager_with(settings, &toolbox).ensure_base_installation();

        assert!(matches!(result, Err(K2sError::MissingConda)));
        assert!(toolbox.fetches().is_empty());
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn test_installs_locally_when_missing() {
        let fx = Fixture::new();
        let toolbox = Arc::new(RecordingToolbox::new());

        let installation = fx.manager(&toolbox).ensure_base_installation().unwrap();

        assert_eq!(installation.prefix, fx.local_conda());
        assert!(installation.locally_installed);
        assert_eq!(toolbox.fetches().len(), 1);

        let lines = toolbox.command_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("bash "));
        assert!(lines[0].ends_with(&format!("-b -p {}", fx.local_conda().display())));
    }

    #[test]
    fn test_uses_system_conda_without_self_install() {
        let fx = Fixture::new();
        let toolbox = Arc::new(
            RecordingToolbox::new().with_binary("conda", "/usr/local/miniconda/bin/conda"),
        );
        let mut settings = fx.settings();
        settings.install_conda = false;

        let manager = fx.manager_with(settings, &toolbox);
        let installation = manager.ensure_base_installation().unwrap();

        assert_eq!(installation.prefix, PathBuf::from("/usr/local/miniconda"));
        assert!(!installation.locally_installed);
        assert!(toolbox.calls().is_empty());
        assert_eq!(
            manager.base_mamba_bin().unwrap(),
            PathBuf::from("/usr/local/miniconda/bin/mamba")
        );
    }

    #[test]
    fn test_home_is_created() {
        let fx = Fixture::new();
        let nested = fx.home.path().join("nested").join(".k2s");
        let settings = Settings::with_dirs(&nested, fx.work.path());
        let toolbox = Arc::new(RecordingToolbox::new());

        let home = fx.manager_with(settings, &toolbox).home().unwrap();

        assert_eq!(home, nested);
        assert!(nested.is_dir());
    }

    #[test]
    fn test_fast_resolver_present_skips_install() {
        let fx = Fixture::new();
        fx.make_local_conda();
        fs::write(fx.local_conda().join("bin").join("mamba"), "").unwrap();
        let toolbox = Arc::new(RecordingToolbox::new());

        fx.manager(&toolbox).ensure_fast_resolver().unwrap();

        assert!(toolbox.calls().is_empty());
    }

    #[test]
    fn test_fast_resolver_installed_from_conda_forge() {
        let fx = Fixture::new();
        fx.make_local_conda();
        let toolbox = Arc::new(RecordingToolbox::new());

        fx.manager(&toolbox).ensure_fast_resolver().unwrap();

        let calls = toolbox.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, fx.local_conda().join("bin").join("conda"));
        assert_eq!(
            calls[0].args,
            vec![
                "install".to_string(),
                "mamba".to_string(),
                "-c".to_string(),
                "conda-forge".to_string(),
                "-y".to_string(),
                "--prefix".to_string(),
                fx.local_conda().display().to_string(),
            ]
        );
    }

    #[test]
    fn test_bootstrap_with_everything_present_is_silent() {
        let fx = Fixture::new();
        fx.make_local_conda();
        fs::write(fx.local_conda().join("bin").join("mamba"), "").unwrap();
        let toolbox = Arc::new(RecordingToolbox::new());

        let installation = fx.manager(&toolbox).bootstrap().unwrap();

        assert_eq!(installation.prefix, fx.local_conda());
        assert!(toolbox.calls().is_empty());
        assert!(toolbox.fetches().is_empty());
    }

    #[test]
    fn test_create_new_env_writes_spec_and_skips_pin() {
        let fx = Fixture::new();
        let toolbox = Arc::new(RecordingToolbox::new());

        let prefix = fx
            .manager(&toolbox)
            .create_env(Some("analysis"), &reqs(&["numpy"]), None)
            .unwrap();

        let expected_prefix = fx.local_conda().join("envs").join("analysis");
        assert_eq!(prefix, expected_prefix);

        let spec_file = fx.work.path().join("env.yml");
        let spec: Value = serde_json::from_str(&fs::read_to_string(&spec_file).unwrap()).unwrap();
        assert_eq!(spec["channels"], json!(["conda-forge"]));
        assert_eq!(
            spec["dependencies"],
            json!(["numpy", "pip", "ipykernel", "python", {"pip": null}])
        );

        assert!(!expected_prefix.join("conda-meta").join("pinned").exists());
        assert!(toolbox.calls_matching("bin/python").is_empty());

        let calls = toolbox.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, fx.local_conda().join("bin").join("mamba"));
        assert_eq!(
            calls[0].args,
            vec![
                "env".to_string(),
                "update".to_string(),
                "--file".to_string(),
                spec_file.display().to_string(),
                "--prefix".to_string(),
                expected_prefix.display().to_string(),
                "--prune".to_string(),
            ]
        );
    }

    #[test]
    fn test_update_existing_env_pins_python() {
        let fx = Fixture::new();
        let prefix = fx.local_conda().join("envs").join("analysis");
        fs::create_dir_all(prefix.join("bin")).unwrap();
        let toolbox = Arc::new(RecordingToolbox::new().respond("bin/python", "3.8.13\n"));

        fx.manager(&toolbox)
            .create_env(Some("analysis"), &reqs(&["ploomber"]), None)
            .unwrap();

        let pinned = fs::read_to_string(prefix.join("conda-meta").join("pinned")).unwrap();
        assert_eq!(pinned.lines().last(), Some("python==3.8.13"));

        let lines = toolbox.command_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("bin/python -c"));
        assert!(lines[1].contains("env update"));
    }

    #[test]
    fn test_update_existing_env_appends_to_pins() {
        let fx = Fixture::new();
        let prefix = fx.local_conda().join("envs").join("analysis");
        fs::create_dir_all(prefix.join("conda-meta")).unwrap();
        fs::write(prefix.join("conda-meta").join("pinned"), "numpy 1.21.*\n").unwrap();
        let toolbox = Arc::new(RecordingToolbox::new().respond("bin/python", "3.10.4\n"));

        fx.manager(&toolbox)
            .create_env(Some("analysis"), &[], None)
            .unwrap();

        let entries = PinFile::for_prefix(&prefix).entries().unwrap();
        assert_eq!(entries, vec!["numpy 1.21.*", "python==3.10.4"]);
    }

    #[test]
    fn test_bad_python_version_aborts_before_update() {
        let fx = Fixture::new();
        let prefix = fx.local_conda().join("envs").join("broken");
        fs::create_dir_all(&prefix).unwrap();
        let toolbox = Arc::new(RecordingToolbox::new().fail("bin/python", 127, "not found"));

        let result = fx.manager(&toolbox).create_env(Some("broken"), &[], None);

        assert!(matches!(result, Err(K2sError::CommandFailed { .. })));
        assert!(toolbox.calls_matching("env update").is_empty());
    }

    #[test]
    fn test_update_failure_propagates() {
        let fx = Fixture::new();
        let toolbox = Arc::new(RecordingToolbox::new().fail("env update", 1, "ResolvePackageNotFound"));

        let result = fx
            .manager(&toolbox)
            .create_env(Some("analysis"), &reqs(&["not-a-package"]), None);

        match result {
            Err(K2sError::CommandFailed { stderr, .. }) => {
                assert_eq!(stderr, "ResolvePackageNotFound")
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_create_env_without_name_uses_active_prefix() {
        let fx = Fixture::new();
        let active = fx.home.path().join("active-env");
        let info = json!({ "active_prefix": active.display().to_string() }).to_string();
        let toolbox = Arc::new(RecordingToolbox::new().respond("info --json", &info));

        let prefix = fx.manager(&toolbox).create_env(None, &[], None).unwrap();

        assert_eq!(prefix, active);
        let lines = toolbox.command_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(&format!("--prefix {}", active.display())));
    }

    #[test]
    fn test_active_prefix_on_notebook_platform() {
        let fx = Fixture::new();
        let mut settings = fx.settings();
        settings.notebook_platform = true;
        let toolbox = Arc::new(RecordingToolbox::new());

        let prefix = fx.manager_with(settings, &toolbox).active_prefix().unwrap();

        assert_eq!(prefix, PathBuf::from(NOTEBOOK_PLATFORM_PREFIX));
        assert!(toolbox.calls_matching("info").is_empty());
    }

    #[test]
    fn test_active_prefix_empty_is_an_error() {
        for info in [
            r#"{"active_prefix": ""}"#,
            r#"{"active_prefix": null}"#,
            r#"{"conda_version": "23.1.0"}"#,
        ] {
            let fx = Fixture::new();
            let toolbox = Arc::new(RecordingToolbox::new().respond("info --json", info));

            let result = fx.manager(&toolbox).create_env(None, &reqs(&["numpy"]), None);

            assert!(
                matches!(result, Err(K2sError::UnknownActiveEnvironment)),
                "{info}"
            );
            assert!(toolbox.calls_matching("env update").is_empty());
        }
    }

    #[test]
    fn test_prune_is_unsupported() {
        let fx = Fixture::new();
        fx.make_local_conda();
        let toolbox = Arc::new(RecordingToolbox::new());

        let result = fx.manager(&toolbox).prune();

        assert!(matches!(result, Err(K2sError::Unsupported("prune"))));
        assert!(fx.local_conda().is_dir());
        assert!(toolbox.calls().is_empty());
    }
}

//! Runtime Settings
//!
//! All paths the environment manager touches are carried here instead of
//! being read from globals, so tests can point them at temporary
//! directories.
//!
//! Settings are resolved in layers, later layers winning:
//! 1. Built-in defaults (`~/.k2s`, current directory, self-install on)
//! 2. A YAML file (`--config`, or `<home>/config.yaml` when present)
//! 3. The `K2S_HOME` environment variable
//! 4. Command-line flags (applied by the binary)
//!
//! A home given on the command line also decides where the implicit
//! `config.yaml` is looked up.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;

use crate::error::Result;

/// Name of the private home directory under the user's home.
pub const HOME_DIR_NAME: &str = ".k2s";

/// Config file looked up inside the private home.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Overrides the private home directory.
pub const HOME_ENV_VAR: &str = "K2S_HOME";

/// Set inside Kaggle's notebook containers.
pub const NOTEBOOK_PLATFORM_ENV_VAR: &str = "KAGGLE_DOCKER_IMAGE";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Private home, the self-installed conda lives in `<home>/conda`
    pub home: PathBuf,

    /// Directory where `env.yml` is written
    pub work_dir: PathBuf,

    /// Always use (and if needed install) the conda under `home`, even
    /// when another conda is on the PATH
    pub install_conda: bool,

    /// Running inside the containerized notebook platform
    #[serde(skip)]
    pub notebook_platform: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home: default_home(),
            work_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            install_conda: true,
            notebook_platform: env::var_os(NOTEBOOK_PLATFORM_ENV_VAR).is_some(),
        }
    }
}

impl Settings {
    /// Settings rooted at explicit directories, with nothing read from the
    /// process environment.
    pub fn with_dirs(home: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            work_dir: work_dir.into(),
            install_conda: true,
            notebook_platform: false,
        }
    }

    /// Loads settings from `path`, or from `<home>/config.yaml` when no
    /// path is given and that file exists, then applies `K2S_HOME`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, None)
    }

    /// Like [`load`](Self::load), with an explicit home that takes
    /// precedence over `K2S_HOME` both for the implicit config lookup and
    /// for the resulting [`home`](Self::home).
    pub fn load_from(path: Option<&Path>, home: Option<&Path>) -> Result<Self> {
        let home_override = home
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(HOME_ENV_VAR).map(PathBuf::from));

        let candidate = match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let home = home_override.clone().unwrap_or_else(default_home);
                let implicit = home.join(CONFIG_FILE_NAME);
                implicit.is_file().then_some(implicit)
            }
        };

        let mut settings = match candidate {
            Some(file) => {
                info!("Using config: {}", file.display());
                Self::from_yaml(&fs::read_to_string(&file)?)?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        if let Some(home) = home_override {
            settings.home = home;
        }

        Ok(settings)
    }

    /// Parses a YAML document; missing keys keep their defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut settings: Settings = serde_yaml::from_str(content)?;
        settings.home = expand_tilde(&settings.home);
        Ok(settings)
    }

    /// Where a self-installed conda lives.
    pub fn local_conda_dir(&self) -> PathBuf {
        self.home.join("conda")
    }

    /// Path of the environment spec file.
    pub fn spec_file(&self) -> PathBuf {
        self.work_dir.join("env.yml")
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HOME_DIR_NAME)
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

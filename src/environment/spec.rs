//! Environment Specification
//!
//! The declarative file handed to `mamba env update --file`. It is written
//! as JSON (a subset of YAML, so conda reads it fine) under the name
//! `env.yml`.

use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Channels every environment is resolved against.
pub const CHANNELS: &[&str] = &["conda-forge"];

/// Packages added to every environment after the caller's requirements.
pub const BASE_PACKAGES: &[&str] = &["pip", "ipykernel", "python"];

/// One entry of the `dependencies` list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Dependency {
    /// A conda match spec such as `numpy` or `python=3.8.13`
    Package(String),
    /// The nested pip section; `None` serializes as `null` and the key is
    /// always present
    Pip { pip: Option<Vec<String>> },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EnvSpec {
    /// `None` targets the currently active environment
    pub name: Option<String>,
    pub channels: Vec<String>,
    pub dependencies: Vec<Dependency>,
}

impl EnvSpec {
    /// Builds the spec for `requirements` plus the base packages and the
    /// pip section. An empty pip list is treated as no pip requirements.
    pub fn new(
        name: Option<&str>,
        requirements: &[String],
        requirements_pip: Option<&[String]>,
    ) -> Self {
        let pip = requirements_pip
            .filter(|reqs| !reqs.is_empty())
            .map(<[String]>::to_vec);

        let dependencies = requirements
            .iter()
            .cloned()
            .map(Dependency::Package)
            .chain(
                BASE_PACKAGES
                    .iter()
                    .map(|pkg| Dependency::Package(pkg.to_string())),
            )
            .chain(std::iter::once(Dependency::Pip { pip }))
            .collect();

        Self {
            name: name.map(str::to_string),
            channels: CHANNELS.iter().map(|c| c.to_string()).collect(),
            dependencies,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Writes the spec to `path`, replacing any previous file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, &json)?;
        debug!("Wrote environment spec to {}: {}", path.display(), json);
        Ok(())
    }
}

//! Environment Management Module
//!
//! Handles the conda installation k2s runs against and the environments
//! created from it.
//!
//! - [`conda`]: base installation, `mamba` bootstrap, create/update
//! - [`installer`]: Miniconda installer lookup and batch install
//! - [`spec`]: the `env.yml` specification file
//! - [`pin`]: `conda-meta/pinned` handling

pub mod conda;
pub mod installer;
pub mod pin;
pub mod spec;

pub use conda::{CondaManager, Installation, NOTEBOOK_PLATFORM_PREFIX};
pub use installer::installer_url;
pub use pin::PinFile;
pub use spec::{Dependency, EnvSpec};

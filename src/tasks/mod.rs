//! Developer Tasks
//!
//! Named command sequences used while working on k2s itself. Each task
//! runs its commands in order through a [`Toolbox`](crate::process::Toolbox)
//! and stops at the first failure; there is no recovery beyond that.
//!
//! - [`setup`]: dev and JupyterLab environments
//! - [`version`]: tag a release and bump to the next dev version
//! - [`release`]: build a tag and upload it to (Test)PyPI

pub mod release;
pub mod setup;
pub mod version;

pub use release::release;
pub use setup::{activation_hint, setup, setup_jupyter};
pub use version::version;

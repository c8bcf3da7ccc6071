//! k2s - Conda Environments Without the Ceremony
//!
//! Installs a private Miniconda when needed, makes sure `mamba` is
//! available and creates or updates environments from a list of conda and
//! pip requirements, pinning the interpreter of existing environments so
//! an update never swaps Python out from under them.
//!
//! # Architecture
//!
//! - [`environment`]: base installation, spec file, pins, create/update
//! - [`process`]: run-command / download / PATH lookup capabilities
//! - [`tasks`]: developer workflow commands (setup, version, release)
//! - [`config`]: settings threaded through every component
//!
//! # Example
//!
//! ```rust,no_run
//! use k2s::config::Settings;
//! use k2s::environment::CondaManager;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CondaManager::with_system_toolbox(Settings::load(None)?);
//!     manager.bootstrap()?;
//!
//!     let prefix = manager.create_env(Some("analysis"), &["numpy".to_string()], None)?;
//!     println!("Environment ready at {}", prefix.display());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod process;
pub mod tasks;

// Re-export commonly used types
pub use config::Settings;
pub use environment::{CondaManager, EnvSpec, Installation};
pub use error::{K2sError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "k2s";

//! k2s CLI Entry Point
//!
//! # Usage
//!
//! ```bash
//! # Install conda (once) and mamba into ~/.k2s/conda
//! k2s install
//!
//! # Create or update an environment, printing its prefix
//! k2s env create --name analysis numpy pandas --pip ploomber
//!
//! # Update the currently active environment in place
//! k2s env create scikit-learn
//!
//! # Developer tasks
//! k2s task setup --python 3.10
//! k2s task release 0.1.3 --test
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, info};

use k2s::config::Settings;
use k2s::environment::CondaManager;
use k2s::process::SystemToolbox;
use k2s::tasks;
use k2s::{APP_NAME, VERSION};

#[derive(Parser, Debug)]
#[command(name = "k2s", version, about = "Bootstrap conda and manage isolated environments")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (defaults to <home>/config.yaml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Private home directory, also where config.yaml is looked up
    /// (defaults to $K2S_HOME, then ~/.k2s)
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    /// Directory where env.yml is written
    #[arg(long, global = true, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Use the conda on the PATH instead of installing one under the home
    #[arg(long, global = true)]
    no_install_conda: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ensure conda and mamba are installed, then print the base prefix
    Install,

    /// Manage environments
    Env {
        #[command(subcommand)]
        action: EnvCommand,
    },

    /// Delete all environments, kernels and the local installation
    Prune,

    /// Developer workflow tasks
    Task {
        #[command(subcommand)]
        task: TaskCommand,
    },
}

#[derive(Subcommand, Debug)]
enum EnvCommand {
    /// Create or update an environment and print its prefix
    Create {
        /// Environment name; omit to update the active environment
        #[arg(short, long)]
        name: Option<String>,

        /// Pip requirement (repeatable)
        #[arg(long = "pip", value_name = "PKG")]
        pip: Vec<String>,

        /// Conda requirements
        requirements: Vec<String>,
    },

    /// Print the prefix of the active environment
    Active,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Set up the development environment (requires conda)
    #[command(visible_alias = "s")]
    Setup {
        /// Python version (default 3.9)
        #[arg(long)]
        python: Option<String>,

        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Set up a clean environment with JupyterLab for testing
    #[command(visible_alias = "sj")]
    SetupJupyter {
        /// Python version (default 3.8)
        #[arg(long)]
        python: Option<String>,

        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Release the current development version and tag it
    #[command(visible_alias = "v")]
    Version {
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Build a tag and upload it to PyPI
    #[command(visible_alias = "r")]
    Release {
        tag: String,

        /// Upload to TestPyPI instead of PyPI
        #[arg(long)]
        test: bool,

        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Resolves settings from the config file, environment and flags.
fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = Settings::load_from(cli.config.as_deref(), cli.home.as_deref())?;

    if let Some(dir) = &cli.work_dir {
        settings.work_dir = dir.clone();
    }
    if cli.no_install_conda {
        settings.install_conda = false;
    }

    debug!("Settings: {:?}", settings);
    Ok(settings)
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    debug!("{} v{}", APP_NAME, VERSION);

    match &cli.command {
        Command::Install => {
            let manager = CondaManager::with_system_toolbox(load_settings(&cli)?);
            let installation = manager.bootstrap()?;
            println!("{}", installation.prefix.display());
        }
        Command::Env { action } => {
            let manager = CondaManager::with_system_toolbox(load_settings(&cli)?);
            match action {
                EnvCommand::Create {
                    name,
                    pip,
                    requirements,
                } => {
                    manager.bootstrap()?;
                    let pip = (!pip.is_empty()).then_some(pip.as_slice());
                    let prefix = manager.create_env(name.as_deref(), requirements, pip)?;
                    println!("{}", prefix.display());
                }
                EnvCommand::Active => {
                    println!("{}", manager.active_prefix()?.display());
                }
            }
        }
        Command::Prune => {
            let manager = CondaManager::with_system_toolbox(load_settings(&cli)?);
            manager.prune()?;
        }
        Command::Task { task } => run_task(task)?,
    }

    Ok(())
}

fn run_task(task: &TaskCommand) -> Result<(), Box<dyn std::error::Error>> {
    let toolbox = SystemToolbox::new();

    match task {
        TaskCommand::Setup { python, root } => {
            let env = tasks::setup(&toolbox, root, python.as_deref())?;
            println!("{}", tasks::activation_hint(&env).green());
        }
        TaskCommand::SetupJupyter { python, root } => {
            let env = tasks::setup_jupyter(&toolbox, root, python.as_deref())?;
            println!("{}", tasks::activation_hint(&env).green());
        }
        TaskCommand::Version { root } => {
            let today = chrono::Local::now().date_naive();
            let released = tasks::version(&toolbox, root, today)?;
            info!("Tagged {}. Publish with: git push && git push --tags", released);
        }
        TaskCommand::Release { tag, test, root } => {
            tasks::release(&toolbox, root, tag, !test)?;
            println!("{}", format!("Released {}", tag).green());
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

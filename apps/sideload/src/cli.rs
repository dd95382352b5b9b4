//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sideload - install local application bundles
#[derive(Parser)]
#[command(name = "sideload")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Install local application bundles through the platform installer")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging to the log directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Installer service root (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    pub service_root: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show what installing a bundle would do, without installing it
    Inspect {
        /// Path to the bundle
        bundle: PathBuf,
    },

    /// Install a local bundle
    #[command(alias = "i")]
    Install {
        /// Path to the bundle
        bundle: PathBuf,

        /// Accept the installer's confirmation prompt without asking
        #[arg(short = 'y', long, visible_alias = "yes")]
        confirm: bool,
    },

    /// Remove an installed package
    #[command(alias = "rm")]
    Uninstall {
        /// Package id, e.g. com.example.notes
        package: String,
    },

    /// List installed packages
    #[command(alias = "ls")]
    List,

    /// List installer sessions owned by sideload
    Sessions,

    /// Abandon sessions left behind by earlier runs
    Cleanup,
}

impl Commands {
    /// Name used in logs and JSON output
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Inspect { .. } => "inspect",
            Commands::Install { .. } => "install",
            Commands::Uninstall { .. } => "uninstall",
            Commands::List => "list",
            Commands::Sessions => "sessions",
            Commands::Cleanup => "cleanup",
        }
    }
}

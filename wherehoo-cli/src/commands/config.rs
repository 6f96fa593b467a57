//! Config command - show the configuration file and its location.

use std::io;
use std::path::PathBuf;

use clap::Subcommand;
use wherehoo::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration, defaults filled in
    Show {
        /// Configuration file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
        ConfigCommands::Show { config } => {
            let config = match config {
                Some(path) => ConfigFile::load_from(&path)?,
                None => ConfigFile::load()?,
            };
            config.to_ini().write_to(&mut io::stdout())?;
            Ok(())
        }
    }
}

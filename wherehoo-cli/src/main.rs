//! Wherehoo CLI - run and configure a Wherehoo server.

mod commands;
mod error;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::serve::ServeArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "wherehoo", version, about = "Location-indexed record server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the server until interrupted
    Serve {
        /// Configuration file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen address, overriding the config file
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Log at debug level
        #[arg(short, long)]
        verbose: bool,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve {
            config,
            listen,
            verbose,
        } => commands::serve::run(ServeArgs {
            config,
            listen,
            verbose,
        }),
        Commands::Init { force } => commands::init::run(force),
        Commands::Config { command } => commands::config::run(command),
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

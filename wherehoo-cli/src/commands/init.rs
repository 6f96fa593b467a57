//! Init command - write a default configuration file.

use wherehoo::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
pub fn run(force: bool) -> Result<(), CliError> {
    let path = config_file_path();
    if path.exists() && !force {
        println!("Configuration file already exists: {}", path.display());
        println!("Use --force to overwrite it with defaults.");
        return Ok(());
    }

    let path = ConfigFile::default().save()?;
    println!("Configuration file: {}", path.display());
    println!();
    println!("Add client identities under [identities] before serving inserts.");
    Ok(())
}

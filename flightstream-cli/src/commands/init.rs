//! Init command - write the default configuration file.

use std::path::PathBuf;

use flightstream::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
pub fn run(path: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = path.unwrap_or_else(config_file_path);

    if force {
        ConfigFile::default().save_to(&path)?;
        println!("Wrote default configuration: {}", path.display());
    } else if ConfigFile::ensure_exists(&path)? {
        println!("Created configuration file: {}", path.display());
    } else {
        println!("Configuration file already exists: {}", path.display());
        println!("Use --force to overwrite it with defaults.");
        return Ok(());
    }

    println!();
    println!("Set [feed] username and password before running.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}

//! Init and Config commands.

use std::path::Path;

use crate::config::{ConfigError, Settings};

/// Run init command - create configuration file in `dir`.
pub fn run_init(dir: &Path, force: bool) -> Result<(), ConfigError> {
    let path = Settings::init_config_file(dir, force)?;
    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to customize your settings.");
    Ok(())
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> Result<(), ConfigError> {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

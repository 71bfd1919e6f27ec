//! Command-line interface definitions and handlers.

mod args;

pub use args::{Cli, CliCommand};

use crate::config::Config;
use anyhow::{Context, Result};

/// Print the effective configuration as TOML.
pub fn handle_config_command() -> Result<()> {
    let config = Config::load()?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    print!("{}", rendered);
    Ok(())
}

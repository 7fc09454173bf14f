use colored::Colorize;

use crate::cli::{Cli, ConfigCommands};
use crate::commands::load_config;
use crate::config::ExperimentConfig;
use crate::error::{FpscopeError, Result};

pub async fn run(cli: &Cli, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => show(cli),
        ConfigCommands::Path => {
            println!("{}", ExperimentConfig::config_path().display());
            Ok(())
        }
    }
}

fn show(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let rendered =
        toml::to_string_pretty(&config).map_err(|e| FpscopeError::ConfigError(e.to_string()))?;

    println!("{}", "Effective configuration".bold());
    println!("{rendered}");
    Ok(())
}

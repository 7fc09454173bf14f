pub mod analyze;
pub mod browsers;
pub mod config;
pub mod run;

use crate::cli::Cli;
use crate::config::ExperimentConfig;
use crate::error::Result;

/// Load configuration and apply the global CLI overrides.
pub fn load_config(cli: &Cli) -> Result<ExperimentConfig> {
    let mut config = ExperimentConfig::load()?;

    if let Some(ref dir) = cli.results_dir {
        config.results_dir = dir.clone();
    }
    if cli.headed {
        config.headless = false;
    }

    Ok(config)
}

use clap::{Parser, Subcommand};

use crate::commands;
use crate::error::Result;

/// fpscope - longitudinal browser-fingerprinting exposure experiments
#[derive(Parser)]
#[command(name = "fpscope")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Results directory (overrides configuration)
    #[arg(long, env = "FPSCOPE_RESULTS_DIR", global = true)]
    pub results_dir: Option<String>,

    /// Run browsers with a visible window instead of headless
    #[arg(long, global = true)]
    pub headed: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the website x browser experiment matrix for one visit
    Run {
        /// Visit index in the longitudinal protocol (1 = initial visit)
        #[arg(long, default_value = "1")]
        visit: u32,

        /// Session duration in seconds (overrides configuration)
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Analyze the persisted session corpus and export the summary table
    Analyze {
        /// How many sites to show in the fingerprinting ranking
        #[arg(long, default_value = "20")]
        top: usize,

        /// CSV output path (default: <results-dir>/results_summary.csv)
        #[arg(long, value_name = "FILE")]
        csv: Option<String>,
    },

    /// Check which configured browsers are installed
    Browsers,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Run { visit, duration } => commands::run::run(self, *visit, *duration).await,
            Commands::Analyze { top, csv } => {
                commands::analyze::run(self, *top, csv.as_deref()).await
            }
            Commands::Browsers => commands::browsers::run(self).await,
            Commands::Config { command } => commands::config::run(self, command).await,
        }
    }
}

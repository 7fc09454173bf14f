use std::str::FromStr;

use colored::Colorize;

use crate::browser::{locate_browser, BrowserKind};
use crate::cli::Cli;
use crate::commands::load_config;
use crate::error::Result;

/// Environment check: report which configured browsers resolve to an
/// installed executable. Purely informational, never fails the command.
pub async fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    println!("{}", "Configured browsers".bold());
    for name in config.validated_browsers() {
        let kind = match BrowserKind::from_str(&name) {
            Ok(kind) => kind,
            Err(_) => continue,
        };

        match locate_browser(kind) {
            Ok(info) => {
                let version = info.version.as_deref().unwrap_or("unknown version");
                println!(
                    "  {} {:<10} {} ({})",
                    "✓".green(),
                    name,
                    info.path.display(),
                    version
                );
            }
            Err(_) => {
                println!("  {} {:<10} not installed", "✗".red(), name);
            }
        }
    }

    Ok(())
}

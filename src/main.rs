use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fpscope::cli::Cli;
use fpscope::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Suppress noisy chromiumoxide errors: Chrome sends CDP events newer
    // than the library knows about, which is harmless here.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_level)
            .add_directive("chromiumoxide::conn=warn".parse().unwrap())
            .add_directive("chromiumoxide::handler=warn".parse().unwrap())
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    cli.run().await
}

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use indicatif::ProgressBar;

use crate::browser::SessionOptions;
use crate::cli::Cli;
use crate::commands::load_config;
use crate::error::{FpscopeError, Result};
use crate::experiment::{CdpDriver, ExperimentOrchestrator, ExperimentPlan, ShutdownSignal};
use crate::probe::{FingerprintProbe, ScriptProbe};
use crate::results::ResultStore;

pub async fn run(cli: &Cli, visit: u32, duration: Option<u64>) -> Result<()> {
    let mut config = load_config(cli)?;
    if let Some(d) = duration {
        config.session_duration = d;
    }

    if visit == 0 {
        return Err(FpscopeError::ConfigError(
            "visit index starts at 1".to_string(),
        ));
    }
    if visit > config.visits_per_browser {
        tracing::warn!(
            "Visit {} exceeds configured visits_per_browser ({})",
            visit,
            config.visits_per_browser
        );
    }

    let websites = config.effective_websites();
    let browsers = config.validated_browsers();

    println!("{}", "Browser fingerprinting exposure experiment".bold());
    println!("  Browsers:           {}", browsers.join(", "));
    println!("  Websites:           {}", websites.len());
    println!("  Session duration:   {}s", config.session_duration);
    println!("  Visits per browser: {}", config.visits_per_browser);
    println!("  Visit interval:     {} days", config.days_between_visits);
    println!("  Results directory:  {}", config.results_dir);
    println!("  Visit index:        {visit}");
    println!();

    // Fail fast on the essentials before any browser starts: the probe
    // script and a writable results directory.
    let probe: Arc<dyn FingerprintProbe> =
        Arc::new(ScriptProbe::load(&config.probe_script_path())?);
    let store = ResultStore::new(config.results_dir_path())?;

    let options = SessionOptions {
        headless: config.headless,
        page_load_timeout: Duration::from_secs(config.page_load_timeout),
        interaction: Default::default(),
    };
    let plan = ExperimentPlan {
        websites,
        browsers,
        session_duration: config.session_duration,
    };

    let shutdown = Arc::new(ShutdownSignal::new());
    {
        let signal = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, finishing up");
                signal.trigger();
            }
        });
    }

    let orchestrator = ExperimentOrchestrator::new(CdpDriver::new(probe, options), store, plan)
        .with_shutdown(Arc::clone(&shutdown));

    let bar = ProgressBar::new(orchestrator.cell_count() as u64);
    let orchestrator = orchestrator.with_progress(bar.clone());

    let report = orchestrator.run(visit).await?;
    bar.finish_and_clear();

    println!();
    if shutdown.is_triggered() {
        println!("{}", "Experiment interrupted.".yellow().bold());
    } else {
        println!("{}", "Experiment completed.".green().bold());
    }
    println!(
        "  Sessions: {} total, {} successful, {}",
        report.total_sessions,
        report.successful_sessions.to_string().green(),
        format!("{} failed", report.failed_sessions).red()
    );
    println!("  Results saved in: {}", config.results_dir);

    Ok(())
}

//! Experiment orchestration: the (website x browser) matrix for one visit.
//!
//! Sessions run strictly sequentially, one browser instance at a time, so
//! resource contention never skews the interaction timing the entropy
//! measurement depends on. Individual site visits are inherently unreliable
//! (network errors, anti-bot blocks, timeouts), so per-cell failures are
//! recorded and the matrix continues; only configuration and storage
//! problems abort a run.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::ProgressBar;
use rand::Rng;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::browser::{BrowserKind, SessionOptions, SessionRunner};
use crate::entropy::attribute_entropies;
use crate::error::Result;
use crate::probe::{FingerprintProbe, ProbeCapture};
use crate::results::{ResultStore, SessionResult, SummaryReport};

/// Randomized courtesy pause between matrix cells, in milliseconds.
const CELL_PAUSE_MS: (u64, u64) = (2_000, 5_000);

/// Cooperative shutdown shared between the Ctrl-C handler and the
/// orchestrator. Triggering wakes the in-flight session race at once
/// instead of waiting for a poll interval.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `trigger` has been called, immediately if it
    /// already was.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender outlives this borrow, so the channel cannot close.
        let _ = rx.wait_for(|&triggered| triggered).await;
    }
}

/// Runs one complete session for a matrix cell. The orchestrator only sees
/// this seam, so its matrix, persistence and reporting logic is exercised
/// in tests with a scripted driver instead of a live browser.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    async fn run_session(
        &self,
        website: &str,
        browser: &str,
        session_duration: Duration,
    ) -> Result<ProbeCapture>;
}

/// The real driver: one [`SessionRunner`] per cell, closed on every path.
pub struct CdpDriver {
    probe: Arc<dyn FingerprintProbe>,
    options: SessionOptions,
}

impl CdpDriver {
    pub fn new(probe: Arc<dyn FingerprintProbe>, options: SessionOptions) -> Self {
        Self { probe, options }
    }
}

#[async_trait]
impl SessionDriver for CdpDriver {
    async fn run_session(
        &self,
        website: &str,
        browser: &str,
        session_duration: Duration,
    ) -> Result<ProbeCapture> {
        let kind = BrowserKind::from_str(browser)?;
        let mut runner = SessionRunner::new(kind, Arc::clone(&self.probe), self.options.clone());

        let outcome = match runner.launch().await {
            Ok(()) => runner.visit(website, session_duration).await,
            Err(e) => Err(e),
        };

        runner.close().await;
        outcome.map(|(capture, _stats)| capture)
    }
}

/// The matrix to execute for one visit index.
#[derive(Debug, Clone)]
pub struct ExperimentPlan {
    pub websites: Vec<String>,
    pub browsers: Vec<String>,
    pub session_duration: u64,
}

pub struct ExperimentOrchestrator<D: SessionDriver> {
    driver: D,
    store: ResultStore,
    plan: ExperimentPlan,
    shutdown: Arc<ShutdownSignal>,
    progress: Option<ProgressBar>,
    cell_pause: bool,
}

impl<D: SessionDriver> ExperimentOrchestrator<D> {
    pub fn new(driver: D, store: ResultStore, plan: ExperimentPlan) -> Self {
        Self {
            driver,
            store,
            plan,
            shutdown: Arc::new(ShutdownSignal::new()),
            progress: None,
            cell_pause: true,
        }
    }

    /// Share a shutdown signal with the caller; when it triggers, the
    /// in-flight session is torn down and no further cells start.
    pub fn with_shutdown(mut self, signal: Arc<ShutdownSignal>) -> Self {
        self.shutdown = signal;
        self
    }

    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Skip inter-cell pauses. Load-spreading courtesy only, not a
    /// correctness requirement, so tests turn it off.
    pub fn without_cell_pause(mut self) -> Self {
        self.cell_pause = false;
        self
    }

    pub fn cell_count(&self) -> usize {
        self.plan.websites.len() * self.plan.browsers.len()
    }

    /// Execute the matrix for `visit_number` in website-major, browser-minor
    /// order, persisting each result before the next cell, and finish with a
    /// persisted summary report covering whatever completed.
    pub async fn run(&self, visit_number: u32) -> Result<SummaryReport> {
        tracing::info!(
            "Starting experiment - visit {} ({} websites x {} browsers)",
            visit_number,
            self.plan.websites.len(),
            self.plan.browsers.len()
        );

        let duration = Duration::from_secs(self.plan.session_duration);
        let mut results: Vec<SessionResult> = Vec::new();

        'matrix: for website in &self.plan.websites {
            for browser in &self.plan.browsers {
                if self.shutdown.is_triggered() {
                    tracing::info!("Experiment interrupted, stopping before {website} on {browser}");
                    break 'matrix;
                }

                if let Some(ref bar) = self.progress {
                    bar.set_message(format!("{browser} @ {website}"));
                }

                let outcome = tokio::select! {
                    outcome = self.driver.run_session(website, browser, duration) => Some(outcome),
                    _ = self.shutdown.triggered() => None,
                };

                let result = match outcome {
                    None => {
                        // The driver future was dropped; the session process
                        // and profile are released by kill_on_drop / TempDir.
                        tracing::info!("Experiment interrupted during {website} on {browser}");
                        break 'matrix;
                    }
                    Some(Ok(capture)) => {
                        let entropies = attribute_entropies(&capture.data);
                        let result = SessionResult::succeeded(
                            website,
                            browser,
                            visit_number,
                            capture,
                            entropies,
                        );
                        tracing::info!(
                            "Session {} completed, total entropy: {:.2} bits",
                            result.session_id,
                            result.total_entropy()
                        );
                        result
                    }
                    Some(Err(e)) if e.is_session_local() => {
                        tracing::warn!("Session failed for {website} on {browser}: {e}");
                        SessionResult::failed(website, browser, visit_number, e.to_string())
                    }
                    Some(Err(e)) => return Err(e),
                };

                self.store.save_session(&result)?;
                results.push(result);

                if let Some(ref bar) = self.progress {
                    bar.inc(1);
                }

                if self.cell_pause {
                    let pause = {
                        let mut rng = rand::thread_rng();
                        Duration::from_millis(rng.gen_range(CELL_PAUSE_MS.0..=CELL_PAUSE_MS.1))
                    };
                    sleep(pause).await;
                }
            }
        }

        let report = SummaryReport::build(
            &results,
            visit_number,
            self.plan.browsers.clone(),
            self.plan.websites.len(),
            self.plan.session_duration,
        );
        self.store.save_report(&report)?;

        tracing::info!(
            "Experiment completed. Successful: {}, failed: {}",
            report.successful_sessions,
            report.failed_sessions
        );

        Ok(report)
    }
}

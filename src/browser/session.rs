use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use super::discovery::BrowserKind;
use super::interaction::{simulate_activity, InteractionConfig};
use super::launcher::{BrowserLauncher, LaunchedBrowser};
use crate::error::{FpscopeError, Result};
use crate::probe::{FingerprintProbe, ProbeCapture, ProbeStats};

/// Registered on every new document before navigation. Sites bail out of
/// fingerprinting (or fingerprint differently) when they see the WebDriver
/// flag, which would skew the very measurements this tool exists for.
const WEBDRIVER_SCRUB_JS: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined
    });
"#;

/// Interval after the interaction phase, giving late scripts a chance to
/// finish before the log is pulled.
const SETTLE_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Launching,
    NavigatedAndInjected,
    Simulating,
    Collected,
    Closed,
    Errored,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub headless: bool,
    pub page_load_timeout: Duration,
    pub interaction: InteractionConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            headless: true,
            page_load_timeout: Duration::from_secs(30),
            interaction: InteractionConfig::default(),
        }
    }
}

/// Owns one browser-session lifecycle:
/// launch -> navigate + inject -> simulate -> collect -> close.
///
/// `close` must run on every exit path; [`crate::experiment::CdpDriver`]
/// wraps the lifecycle so that holds for success and failure alike. Even if
/// it didn't, the launched process is `kill_on_drop` and the profile is a
/// `TempDir`, so nothing survives the runner being dropped.
pub struct SessionRunner {
    kind: BrowserKind,
    options: SessionOptions,
    probe: Arc<dyn FingerprintProbe>,
    state: SessionState,
    launched: Option<LaunchedBrowser>,
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
}

impl SessionRunner {
    pub fn new(kind: BrowserKind, probe: Arc<dyn FingerprintProbe>, options: SessionOptions) -> Self {
        Self {
            kind,
            options,
            probe,
            state: SessionState::Idle,
            launched: None,
            browser: None,
            handler_task: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn errored(&mut self, e: FpscopeError) -> FpscopeError {
        self.state = SessionState::Errored;
        e
    }

    /// Start an isolated browser instance and connect to it over CDP.
    pub async fn launch(&mut self) -> Result<()> {
        self.state = SessionState::Launching;

        let launcher = BrowserLauncher::new(self.kind)
            .map_err(|e| self.errored(e))?
            .headless(self.options.headless);

        let launched = match launcher.launch().await {
            Ok(l) => l,
            Err(e) => return Err(self.errored(e)),
        };

        let (browser, mut handler) = match Browser::connect(&launched.ws_url).await {
            Ok(pair) => pair,
            Err(e) => {
                return Err(self.errored(FpscopeError::CdpConnectionFailed(format!(
                    "failed to connect to {}: {e}",
                    self.kind.name()
                ))))
            }
        };

        // Drain CDP events for the lifetime of the session.
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        tracing::info!("Started {} session", self.kind.name());

        self.launched = Some(launched);
        self.browser = Some(browser);
        self.handler_task = Some(handler_task);
        Ok(())
    }

    /// Navigate, inject the probe, drive the interaction phase, and pull the
    /// fingerprint log back out of the page.
    pub async fn visit(
        &mut self,
        url: &str,
        session_duration: Duration,
    ) -> Result<(ProbeCapture, ProbeStats)> {
        let browser = match self.browser.as_ref() {
            Some(b) => b,
            None => {
                return Err(self.errored(FpscopeError::BrowserCrash(
                    "visit called without a live browser".to_string(),
                )))
            }
        };

        tracing::info!("Visiting {}", url);

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                // A dead target here almost always means the process went away.
                return Err(self.errored(FpscopeError::BrowserCrash(format!(
                    "could not open a page: {e}"
                ))));
            }
        };

        if let Err(e) = self.scrub_webdriver_flag(&page).await {
            return Err(self.errored(e));
        }

        let navigation = timeout(self.options.page_load_timeout, async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<(), FpscopeError>(())
        })
        .await;

        match navigation {
            Err(_) => {
                return Err(self.errored(FpscopeError::NavigationTimeout(format!(
                    "{url} did not load within {:?}",
                    self.options.page_load_timeout
                ))))
            }
            Ok(Err(e)) => return Err(self.errored(e)),
            Ok(Ok(())) => {}
        }

        // Inject the probe immediately so early fingerprinting is captured.
        if let Err(e) = page.evaluate(self.probe.source()).await {
            return Err(self.errored(FpscopeError::ProbeRetrieval(format!(
                "probe injection failed: {e}"
            ))));
        }
        self.state = SessionState::NavigatedAndInjected;

        self.state = SessionState::Simulating;
        simulate_activity(&page, session_duration, &self.options.interaction).await;

        sleep(SETTLE_INTERVAL).await;

        let capture = match self.probe.collect(&page).await {
            Ok(c) => c,
            Err(e) => return Err(self.errored(e)),
        };
        let stats = match self.probe.stats(&page).await {
            Ok(s) => s,
            Err(e) => return Err(self.errored(e)),
        };
        self.state = SessionState::Collected;

        tracing::info!(
            "Captured {} fingerprinting API calls from {}",
            stats.total,
            url
        );

        Ok((capture, stats))
    }

    async fn scrub_webdriver_flag(&self, page: &Page) -> Result<()> {
        let params = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(WEBDRIVER_SCRUB_JS)
            .build()
            .map_err(FpscopeError::Other)?;

        page.execute(params).await?;

        // The first document was created before the registration took effect.
        page.evaluate(WEBDRIVER_SCRUB_JS).await?;
        Ok(())
    }

    /// Tear down the browser process and its profile directory. Safe to call
    /// in any state, including after a failure or a partial launch.
    pub async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::debug!("Graceful browser close failed: {}", e);
            }
        }

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }

        if let Some(mut launched) = self.launched.take() {
            let _ = launched.child.start_kill();
            let _ = launched.child.wait().await;
            // Dropping `launched` removes the temporary profile directory.
        }

        if self.state != SessionState::Errored {
            self.state = SessionState::Closed;
        }

        tracing::info!("Closed {} session", self.kind.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ScriptProbe;

    fn runner() -> SessionRunner {
        SessionRunner::new(
            BrowserKind::Chrome,
            Arc::new(ScriptProbe::from_source("// test probe")),
            SessionOptions::default(),
        )
    }

    #[test]
    fn starts_idle() {
        assert_eq!(runner().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn visit_before_launch_is_a_crash_error() {
        let mut r = runner();
        let result = r.visit("https://example.org", Duration::from_secs(1)).await;

        assert!(matches!(result, Err(FpscopeError::BrowserCrash(_))));
        assert_eq!(r.state(), SessionState::Errored);
    }

    #[tokio::test]
    async fn close_is_safe_in_any_state() {
        let mut r = runner();
        r.close().await;
        assert_eq!(r.state(), SessionState::Closed);

        // Errored state is absorbing; close does not overwrite it.
        let mut r = runner();
        let _ = r.visit("https://example.org", Duration::from_secs(1)).await;
        r.close().await;
        assert_eq!(r.state(), SessionState::Errored);
    }
}

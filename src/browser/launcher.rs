use std::net::TcpListener;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::time::sleep;

use super::discovery::{locate_browser, BrowserInfo, BrowserKind};
use crate::error::{FpscopeError, Result};

/// How long to poll the CDP endpoint before declaring the launch failed.
const CDP_READY_ATTEMPTS: u32 = 20;
const CDP_READY_POLL: Duration = Duration::from_millis(500);

/// A running browser process with its disposable profile.
///
/// The profile directory is a `TempDir` deleted when this is dropped, and
/// the child is spawned with `kill_on_drop`, so even an abandoned launch
/// (cancellation, panic) cannot leak state into a later session.
pub struct LaunchedBrowser {
    pub child: Child,
    pub profile_dir: TempDir,
    pub cdp_port: u16,
    pub ws_url: String,
}

/// Launches one isolated browser instance with CDP enabled.
///
/// Every launch gets a fresh temporary profile: sessions must never share
/// cookies, cache, or storage, or cross-visit entropy measurements would be
/// contaminated by leftover state.
pub struct BrowserLauncher {
    browser_info: BrowserInfo,
    headless: bool,
}

impl BrowserLauncher {
    pub fn new(kind: BrowserKind) -> Result<Self> {
        let browser_info = locate_browser(kind)?;
        Ok(Self {
            browser_info,
            headless: true,
        })
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn browser_info(&self) -> &BrowserInfo {
        &self.browser_info
    }

    fn build_args(&self, cdp_port: u16, profile_dir: &Path) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={cdp_port}"),
            format!("--user-data-dir={}", profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            // Keep the instance quiet and fully isolated: no sync, no
            // background traffic, no component updates polluting the
            // network trace or the profile.
            "--disable-extensions".to_string(),
            "--disable-default-apps".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-sync".to_string(),
            "--disable-translate".to_string(),
            "--disable-component-update".to_string(),
            "--disable-client-side-phishing-detection".to_string(),
            "--disable-domain-reliability".to_string(),
            "--disable-hang-monitor".to_string(),
            "--disable-prompt-on-repost".to_string(),
            "--metrics-recording-only".to_string(),
            "--safebrowsing-disable-auto-update".to_string(),
            "--disable-background-timer-throttling".to_string(),
            "--disable-backgrounding-occluded-windows".to_string(),
            "--disable-renderer-backgrounding".to_string(),
            "--disable-dev-shm-usage".to_string(),
            // Sites fingerprint automation; present a plain browser.
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-infobars".to_string(),
            "--window-size=1920,1080".to_string(),
            "--log-level=3".to_string(),
        ];

        if self.headless {
            args.push("--headless=new".to_string());
        }

        args
    }

    /// Launch the browser with a fresh profile and wait for CDP to be ready.
    pub async fn launch(&self) -> Result<LaunchedBrowser> {
        let profile_dir = TempDir::with_prefix("fpscope-profile-").map_err(|e| {
            FpscopeError::LaunchFailed(format!("cannot create profile directory: {e}"))
        })?;
        let cdp_port = free_port()?;
        let args = self.build_args(cdp_port, profile_dir.path());

        tracing::debug!(
            "Launching {} ({:?}) on CDP port {}",
            self.browser_info.kind.name(),
            self.browser_info.path,
            cdp_port
        );

        let child = Command::new(&self.browser_info.path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                FpscopeError::LaunchFailed(format!(
                    "failed to launch {}: {e}",
                    self.browser_info.kind.name()
                ))
            })?;

        let ws_url = self.wait_for_cdp(cdp_port).await?;

        Ok(LaunchedBrowser {
            child,
            profile_dir,
            cdp_port,
            ws_url,
        })
    }

    /// Poll `/json/version` until the WebSocket debugger URL appears.
    async fn wait_for_cdp(&self, cdp_port: u16) -> Result<String> {
        let url = format!("http://127.0.0.1:{cdp_port}/json/version");

        // Bypass any configured proxy for localhost.
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        for attempt in 0..CDP_READY_ATTEMPTS {
            sleep(CDP_READY_POLL).await;

            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response.json().await.map_err(|e| {
                        FpscopeError::CdpConnectionFailed(format!(
                            "failed to parse CDP response: {e}"
                        ))
                    })?;

                    if let Some(ws_url) = json.get("webSocketDebuggerUrl").and_then(|v| v.as_str())
                    {
                        tracing::debug!("CDP ready at: {}", ws_url);
                        return Ok(ws_url.to_string());
                    }
                }
                Ok(_) => {
                    tracing::debug!("CDP not ready yet (attempt {})", attempt + 1);
                }
                Err(e) => {
                    tracing::debug!("CDP connection attempt {} failed: {}", attempt + 1, e);
                }
            }
        }

        Err(FpscopeError::LaunchFailed(format!(
            "{} did not expose a CDP endpoint within {:?}",
            self.browser_info.kind.name(),
            CDP_READY_POLL * CDP_READY_ATTEMPTS
        )))
    }
}

/// Ask the OS for a free localhost port. The listener is dropped before the
/// browser starts, which is a small race, but launches are strictly
/// sequential so nothing else in this process competes for the port.
fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| FpscopeError::LaunchFailed(format!("cannot allocate CDP port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| FpscopeError::LaunchFailed(format!("cannot read CDP port: {e}")))?
        .port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_port_is_nonzero() {
        assert!(free_port().unwrap() > 0);
    }

    #[test]
    fn build_args_isolate_the_profile() {
        let launcher = BrowserLauncher {
            browser_info: BrowserInfo::new(BrowserKind::Chrome, "/usr/bin/true".into()),
            headless: true,
        };

        let dir = tempfile::tempdir().unwrap();
        let args = launcher.build_args(9333, dir.path());

        assert!(args.contains(&"--remote-debugging-port=9333".to_string()));
        assert!(args.contains(&format!("--user-data-dir={}", dir.path().display())));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--disable-sync".to_string()));
    }

    #[test]
    fn headed_mode_omits_headless_flag() {
        let launcher = BrowserLauncher {
            browser_info: BrowserInfo::new(BrowserKind::Chrome, "/usr/bin/true".into()),
            headless: true,
        }
        .headless(false);

        let dir = tempfile::tempdir().unwrap();
        let args = launcher.build_args(9333, dir.path());
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }
}

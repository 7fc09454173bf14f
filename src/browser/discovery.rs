use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use crate::error::{FpscopeError, Result};

/// Browser families the experiment can drive. All are Chromium-based and
/// controlled over CDP; the identifier itself is what ends up in persisted
/// records, so it doubles as the comparison axis in the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chrome,
    Chromium,
    Brave,
    Edge,
}

impl BrowserKind {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "Google Chrome",
            BrowserKind::Chromium => "Chromium",
            BrowserKind::Brave => "Brave",
            BrowserKind::Edge => "Microsoft Edge",
        }
    }

    /// The lowercase identifier used in configuration and session records.
    pub fn id(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Chromium => "chromium",
            BrowserKind::Brave => "brave",
            BrowserKind::Edge => "edge",
        }
    }
}

impl FromStr for BrowserKind {
    type Err = FpscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "google-chrome" => Ok(BrowserKind::Chrome),
            "chromium" | "chromium-browser" => Ok(BrowserKind::Chromium),
            "brave" | "brave-browser" => Ok(BrowserKind::Brave),
            "edge" | "microsoft-edge" | "msedge" => Ok(BrowserKind::Edge),
            other => Err(FpscopeError::ConfigError(format!(
                "unknown browser identifier: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserInfo {
    pub kind: BrowserKind,
    pub path: PathBuf,
    pub version: Option<String>,
}

impl BrowserInfo {
    pub fn new(kind: BrowserKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            version: None,
        }
    }

    pub fn with_version(mut self) -> Self {
        self.version = detect_version(&self.path);
        self
    }
}

/// Resolve a browser kind to an installed executable.
pub fn locate_browser(kind: BrowserKind) -> Result<BrowserInfo> {
    for candidate in executable_candidates(kind) {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(BrowserInfo::new(kind, path).with_version());
        }
    }

    // Fall back to PATH lookup for distro-specific install locations.
    for name in path_lookup_names(kind) {
        if let Ok(path) = which::which(name) {
            return Ok(BrowserInfo::new(kind, path).with_version());
        }
    }

    Err(FpscopeError::BrowserNotFound(kind.id().to_string()))
}

fn executable_candidates(kind: BrowserKind) -> Vec<&'static str> {
    #[cfg(target_os = "macos")]
    {
        match kind {
            BrowserKind::Chrome => vec![
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            ],
            BrowserKind::Chromium => vec![
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
            ],
            BrowserKind::Brave => vec![
                "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            ],
            BrowserKind::Edge => vec![
                "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            ],
        }
    }

    #[cfg(target_os = "linux")]
    {
        match kind {
            BrowserKind::Chrome => vec![
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "/usr/bin/google-chrome-beta",
            ],
            BrowserKind::Chromium => vec![
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
            ],
            BrowserKind::Brave => vec!["/usr/bin/brave-browser", "/usr/bin/brave"],
            BrowserKind::Edge => vec![
                "/usr/bin/microsoft-edge",
                "/usr/bin/microsoft-edge-stable",
            ],
        }
    }

    #[cfg(target_os = "windows")]
    {
        match kind {
            BrowserKind::Chrome => vec![
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            ],
            BrowserKind::Chromium => vec![r"C:\Program Files\Chromium\Application\chrome.exe"],
            BrowserKind::Brave => vec![
                r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
                r"C:\Program Files (x86)\BraveSoftware\Brave-Browser\Application\brave.exe",
            ],
            BrowserKind::Edge => vec![
                r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            ],
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = kind;
        vec![]
    }
}

fn path_lookup_names(kind: BrowserKind) -> Vec<&'static str> {
    match kind {
        BrowserKind::Chrome => vec!["google-chrome", "google-chrome-stable"],
        BrowserKind::Chromium => vec!["chromium", "chromium-browser"],
        BrowserKind::Brave => vec!["brave-browser", "brave"],
        BrowserKind::Edge => vec!["microsoft-edge", "msedge"],
    }
}

/// Detect the browser version from `--version` output, e.g.
/// "Google Chrome 120.0.6099.109" -> "120.0.6099.109".
fn detect_version(path: &Path) -> Option<String> {
    let output = Command::new(path).arg("--version").output().ok()?;

    if !output.status.success() {
        return None;
    }

    let version = String::from_utf8_lossy(&output.stdout);
    let version = version.trim();
    match version.rfind(' ') {
        Some(idx) => Some(version[idx + 1..].to_string()),
        None => Some(version.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_configured_identifiers() {
        assert_eq!(BrowserKind::from_str("chrome").unwrap(), BrowserKind::Chrome);
        assert_eq!(BrowserKind::from_str("Edge").unwrap(), BrowserKind::Edge);
        assert_eq!(
            BrowserKind::from_str(" chromium ").unwrap(),
            BrowserKind::Chromium
        );
        assert!(BrowserKind::from_str("firefox").is_err());
    }

    #[test]
    fn id_round_trips_through_from_str() {
        for kind in [
            BrowserKind::Chrome,
            BrowserKind::Chromium,
            BrowserKind::Brave,
            BrowserKind::Edge,
        ] {
            assert_eq!(BrowserKind::from_str(kind.id()).unwrap(), kind);
        }
    }
}

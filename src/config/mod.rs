use std::path::{Path, PathBuf};
use std::str::FromStr;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::browser::BrowserKind;
use crate::error::{FpscopeError, Result};

/// Experiment configuration.
///
/// Every key has a documented default; a missing or partial config file
/// never aborts a run. The one essential value is the probe script, which
/// is checked separately before any session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Browser identifiers to test (chrome, chromium, brave, edge).
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,

    /// Target websites, visited in listed order.
    #[serde(default = "default_websites")]
    pub websites: Vec<String>,

    /// Optional JSON file (`{"websites": [...]}`) overriding the inline list.
    pub websites_file: Option<String>,

    /// Per-session interaction duration in seconds.
    #[serde(default = "default_session_duration")]
    pub session_duration: u64,

    /// Number of visits in the longitudinal protocol.
    #[serde(default = "default_visits_per_browser")]
    pub visits_per_browser: u32,

    /// Planned interval between visits, recorded in reports.
    #[serde(default = "default_days_between_visits")]
    pub days_between_visits: u32,

    /// Directory receiving per-session records and summary reports.
    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    /// Path to the detector script injected into every page.
    #[serde(default = "default_probe_script")]
    pub probe_script: String,

    /// Run browsers headless.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Page-load timeout in seconds.
    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout: u64,
}

fn default_browsers() -> Vec<String> {
    vec!["chrome".to_string(), "chromium".to_string()]
}

fn default_websites() -> Vec<String> {
    [
        "https://www.google.com",
        "https://www.facebook.com",
        "https://www.amazon.com",
        "https://www.youtube.com",
        "https://www.wikipedia.org",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_session_duration() -> u64 {
    45
}

fn default_visits_per_browser() -> u32 {
    2
}

fn default_days_between_visits() -> u32 {
    15
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_probe_script() -> String {
    "detector.js".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_page_load_timeout() -> u64 {
    30
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            browsers: default_browsers(),
            websites: default_websites(),
            websites_file: None,
            session_duration: default_session_duration(),
            visits_per_browser: default_visits_per_browser(),
            days_between_visits: default_days_between_visits(),
            results_dir: default_results_dir(),
            probe_script: default_probe_script(),
            headless: default_headless(),
            page_load_timeout: default_page_load_timeout(),
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from all sources (defaults, file, environment).
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(ExperimentConfig::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("FPSCOPE_"))
            .extract()
            .map_err(|e| FpscopeError::ConfigError(e.to_string()))
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fpscope")
            .join("config.toml")
    }

    /// The website list actually used for a run: `websites_file` when set
    /// and readable, otherwise the inline list. An unreadable file is
    /// logged and ignored rather than failing the run.
    pub fn effective_websites(&self) -> Vec<String> {
        if let Some(ref file) = self.websites_file {
            let path = PathBuf::from(shellexpand::tilde(file).to_string());
            match load_websites_file(&path) {
                Ok(websites) if !websites.is_empty() => return websites,
                Ok(_) => {
                    tracing::warn!("Websites file {} is empty, using inline list", file);
                }
                Err(e) => {
                    tracing::warn!("Cannot load websites file {}: {}, using inline list", file, e);
                }
            }
        }
        self.websites.clone()
    }

    /// The browser list with unknown identifiers dropped. Falls back to the
    /// default list when nothing valid remains, so a typo never empties the
    /// experiment matrix.
    pub fn validated_browsers(&self) -> Vec<String> {
        let valid: Vec<String> = self
            .browsers
            .iter()
            .filter(|name| {
                let known = BrowserKind::from_str(name).is_ok();
                if !known {
                    tracing::warn!("Unknown browser '{}' in configuration, skipping", name);
                }
                known
            })
            .cloned()
            .collect();

        if valid.is_empty() {
            tracing::warn!("No valid browsers configured, falling back to defaults");
            default_browsers()
        } else {
            valid
        }
    }

    pub fn results_dir_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.results_dir).to_string())
    }

    pub fn probe_script_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.probe_script).to_string())
    }
}

#[derive(Deserialize)]
struct WebsitesFile {
    #[serde(default)]
    websites: Vec<String>,
}

fn load_websites_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let parsed: WebsitesFile = serde_json::from_str(&content)?;
    Ok(parsed.websites)
}

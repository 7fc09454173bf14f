use thiserror::Error;

#[derive(Error, Debug)]
pub enum FpscopeError {
    #[error("Browser not found: {0}. Install it or remove it from the browser list.")]
    BrowserNotFound(String),

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("CDP connection failed: {0}")]
    CdpConnectionFailed(String),

    #[error("Navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("Probe retrieval failed: {0}")]
    ProbeRetrieval(String),

    #[error("Browser crashed: {0}")]
    BrowserCrash(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("{0}")]
    Other(String),
}

impl FpscopeError {
    /// Whether this error aborts a single session only, as opposed to the
    /// whole experiment run. Configuration and storage problems are fatal;
    /// everything a flaky website or browser can cause is contained.
    pub fn is_session_local(&self) -> bool {
        !matches!(
            self,
            FpscopeError::ConfigError(_) | FpscopeError::StorageError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FpscopeError>;

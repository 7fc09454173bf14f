//! Data contract with the in-page fingerprint-detection probe.
//!
//! The probe itself is an external collaborator: a JavaScript module that
//! hooks fingerprinting-relevant browser APIs and records their use. This
//! crate only relies on the two zero-argument retrievables the probe must
//! expose after injection — `window.getFingerprintData()` and
//! `window.getFingerprintStats()` — and treats everything else about it as
//! opaque. Swapping in a different instrumentation technique only requires
//! another [`FingerprintProbe`] implementation.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FpscopeError, Result};

/// One recorded fingerprinting API invocation.
///
/// Only the `value` field is interpreted (stringified for entropy scoring);
/// whatever else the probe records per call is carried through untouched so
/// persisted sessions round-trip faithfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ApiCall {
    pub fn with_value(value: Value) -> Self {
        Self {
            value: Some(value),
            extra: BTreeMap::new(),
        }
    }

    pub fn without_value() -> Self {
        Self {
            value: None,
            extra: BTreeMap::new(),
        }
    }

    /// The observed value as a distribution symbol: JSON strings verbatim,
    /// anything else in its JSON rendering. `None` when the record carries
    /// no value at all.
    pub fn value_string(&self) -> Option<String> {
        match &self.value {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }
}

/// Category name (canvas, webgl, audio, navigator, ...) to the ordered
/// sequence of calls observed in that category.
pub type FingerprintLog = BTreeMap<String, Vec<ApiCall>>;

/// The structured payload returned by `window.getFingerprintData()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeCapture {
    #[serde(default)]
    pub data: FingerprintLog,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProbeCapture {
    pub fn total_calls(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}

/// The lightweight summary returned by `window.getFingerprintStats()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeStats {
    #[serde(default)]
    pub total: u64,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Capability handle for the in-page probe.
#[async_trait]
pub trait FingerprintProbe: Send + Sync {
    /// JavaScript source injected into the page context after navigation.
    fn source(&self) -> &str;

    /// Retrieve the structured fingerprint log from the page.
    async fn collect(&self, page: &Page) -> Result<ProbeCapture>;

    /// Retrieve the call-count summary from the page.
    async fn stats(&self, page: &Page) -> Result<ProbeStats>;
}

/// Probe implementation backed by a detector script loaded from disk.
pub struct ScriptProbe {
    source: String,
}

impl ScriptProbe {
    /// Load the detector script. A missing script is a configuration error:
    /// every session would fail identically without it, so the run should
    /// fail fast instead.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            FpscopeError::ConfigError(format!(
                "cannot read probe script {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { source })
    }

    #[cfg(test)]
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(
        &self,
        page: &Page,
        expression: &str,
    ) -> Result<T> {
        let result = page.evaluate(expression).await.map_err(|e| {
            FpscopeError::ProbeRetrieval(format!("{expression} failed: {e}"))
        })?;

        result.into_value::<T>().map_err(|e| {
            FpscopeError::ProbeRetrieval(format!("{expression} returned malformed data: {e}"))
        })
    }
}

#[async_trait]
impl FingerprintProbe for ScriptProbe {
    fn source(&self) -> &str {
        &self.source
    }

    async fn collect(&self, page: &Page) -> Result<ProbeCapture> {
        self.evaluate(page, "window.getFingerprintData()").await
    }

    async fn stats(&self, page: &Page) -> Result<ProbeStats> {
        self.evaluate(page, "window.getFingerprintStats()").await
    }
}

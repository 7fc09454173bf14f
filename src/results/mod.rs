//! Persisted experiment records.
//!
//! A [`SessionResult`] is written exactly once, immediately after its
//! session ends, and never mutated afterwards; corrections mean writing a
//! new record. A [`SummaryReport`] is derived and recomputable at any time
//! from the session records, so re-running aggregation is always
//! reproducible from the store.

mod store;

pub use store::ResultStore;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entropy::{EntropyScore, TOTAL_KEY};
use crate::probe::ProbeCapture;

/// Outcome of one (website, browser, visit) trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    pub website: String,
    pub browser: String,
    pub visit_number: u32,
    pub timestamp: DateTime<Utc>,
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint_data: Option<ProbeCapture>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropies: Option<EntropyScore>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionResult {
    pub fn succeeded(
        website: &str,
        browser: &str,
        visit_number: u32,
        fingerprint_data: ProbeCapture,
        entropies: EntropyScore,
    ) -> Self {
        debug_assert!(entropies.contains_key(TOTAL_KEY));
        Self {
            session_id: session_id(browser, website, visit_number),
            website: website.to_string(),
            browser: browser.to_string(),
            visit_number,
            timestamp: Utc::now(),
            success: true,
            fingerprint_data: Some(fingerprint_data),
            entropies: Some(entropies),
            error: None,
        }
    }

    pub fn failed(website: &str, browser: &str, visit_number: u32, error: String) -> Self {
        Self {
            session_id: session_id(browser, website, visit_number),
            website: website.to_string(),
            browser: browser.to_string(),
            visit_number,
            timestamp: Utc::now(),
            success: false,
            fingerprint_data: None,
            entropies: None,
            error: Some(error),
        }
    }

    /// The headline metric: pooled entropy over all categories, in bits.
    pub fn total_entropy(&self) -> f64 {
        self.entropies
            .as_ref()
            .and_then(|e| e.get(TOTAL_KEY))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn entropy_for(&self, category: &str) -> f64 {
        self.entropies
            .as_ref()
            .and_then(|e| e.get(category))
            .copied()
            .unwrap_or(0.0)
    }

    /// Filename for the persisted record. The session id makes reruns
    /// traceable; the timestamp qualifier keeps them from overwriting
    /// earlier attempts.
    pub fn filename(&self) -> String {
        let stamp = self.timestamp.to_rfc3339().replace(':', "-");
        format!("{}_{stamp}.json", self.session_id)
    }
}

/// Deterministic id for one trial: browser + sanitized website + visit.
/// Used for traceability, not uniqueness enforcement.
pub fn session_id(browser: &str, website: &str, visit_number: u32) -> String {
    let sanitized = website
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .replace(['/', ':'], "_");
    let sanitized = sanitized.trim_end_matches('_');
    format!("{browser}_{sanitized}_{visit_number}")
}

/// Per-run digest: counts, the attempted matrix, and mean entropy per
/// category across the run's successful sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub experiment_timestamp: DateTime<Utc>,
    pub visit_number: u32,
    pub total_sessions: usize,
    pub successful_sessions: usize,
    pub failed_sessions: usize,
    pub browsers_tested: Vec<String>,
    pub websites_count: usize,
    pub session_duration: u64,
    pub results_summary: Vec<SummaryEntry>,
    pub average_entropies: EntropyScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub website: String,
    pub browser: String,
    pub timestamp: DateTime<Utc>,
    pub total_api_calls: usize,
    pub entropies: EntropyScore,
}

impl SummaryReport {
    pub fn build(
        results: &[SessionResult],
        visit_number: u32,
        browsers_tested: Vec<String>,
        websites_count: usize,
        session_duration: u64,
    ) -> Self {
        let successful: Vec<&SessionResult> = results.iter().filter(|r| r.success).collect();

        let results_summary = successful
            .iter()
            .map(|r| SummaryEntry {
                website: r.website.clone(),
                browser: r.browser.clone(),
                timestamp: r.timestamp,
                total_api_calls: r
                    .fingerprint_data
                    .as_ref()
                    .map(ProbeCapture::total_calls)
                    .unwrap_or(0),
                entropies: r.entropies.clone().unwrap_or_default(),
            })
            .collect();

        Self {
            experiment_timestamp: Utc::now(),
            visit_number,
            total_sessions: results.len(),
            successful_sessions: successful.len(),
            failed_sessions: results.len() - successful.len(),
            browsers_tested,
            websites_count,
            session_duration,
            results_summary,
            average_entropies: average_entropies(&successful),
        }
    }

    pub fn filename(&self) -> String {
        format!(
            "experiment_report_visit{}_{}.json",
            self.visit_number,
            self.experiment_timestamp.format("%Y%m%d_%H%M%S")
        )
    }
}

/// Mean per category over the sessions that scored that category.
fn average_entropies(successful: &[&SessionResult]) -> EntropyScore {
    let mut categories: BTreeSet<&str> = BTreeSet::new();
    for result in successful {
        if let Some(ref entropies) = result.entropies {
            categories.extend(entropies.keys().map(String::as_str));
        }
    }

    let mut averages = EntropyScore::new();
    for category in categories {
        let values: Vec<f64> = successful
            .iter()
            .filter_map(|r| r.entropies.as_ref().and_then(|e| e.get(category)))
            .copied()
            .collect();
        if !values.is_empty() {
            averages.insert(
                category.to_string(),
                values.iter().sum::<f64>() / values.len() as f64,
            );
        }
    }
    averages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::attribute_entropies;
    use crate::probe::{ApiCall, FingerprintLog};

    fn capture_with(category: &str, values: &[&str]) -> ProbeCapture {
        let mut data = FingerprintLog::new();
        data.insert(
            category.to_string(),
            values
                .iter()
                .map(|v| ApiCall::with_value(serde_json::json!(v)))
                .collect(),
        );
        ProbeCapture {
            data,
            extra: Default::default(),
        }
    }

    fn success(website: &str, browser: &str, visit: u32, values: &[&str]) -> SessionResult {
        let capture = capture_with("canvas", values);
        let entropies = attribute_entropies(&capture.data);
        SessionResult::succeeded(website, browser, visit, capture, entropies)
    }

    #[test]
    fn session_id_strips_scheme_and_slashes() {
        assert_eq!(
            session_id("chrome", "https://www.example.org/path", 1),
            "chrome_www.example.org_path_1"
        );
        assert_eq!(
            session_id("edge", "http://example.org/", 2),
            "edge_example.org_2"
        );
    }

    #[test]
    fn failed_result_carries_error_and_no_data() {
        let result = SessionResult::failed("https://a.example", "chrome", 1, "boom".to_string());

        assert!(!result.success);
        assert!(result.fingerprint_data.is_none());
        assert!(result.entropies.is_none());
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.total_entropy(), 0.0);
    }

    #[test]
    fn failed_result_serializes_without_optional_keys() {
        let result = SessionResult::failed("https://a.example", "chrome", 1, "boom".to_string());
        let json = serde_json::to_value(&result).unwrap();

        assert!(json.get("entropies").is_none());
        assert!(json.get("fingerprint_data").is_none());
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn successful_result_has_total_entropy() {
        let result = success("https://a.example", "chrome", 1, &["x", "y"]);

        assert!(result.success);
        assert!((result.total_entropy() - 1.0).abs() < 1e-9);
        assert_eq!(result.error, None);
    }

    #[test]
    fn filename_has_no_colons() {
        let result = success("https://a.example", "chrome", 1, &["x"]);
        assert!(!result.filename().contains(':'));
        assert!(result.filename().ends_with(".json"));
    }

    #[test]
    fn report_counts_and_averages() {
        let results = vec![
            success("https://a.example", "chrome", 1, &["x", "y"]),
            success("https://b.example", "chrome", 1, &["x", "x"]),
            SessionResult::failed("https://c.example", "edge", 1, "timeout".to_string()),
        ];

        let report = SummaryReport::build(
            &results,
            1,
            vec!["chrome".to_string(), "edge".to_string()],
            3,
            45,
        );

        assert_eq!(report.total_sessions, 3);
        assert_eq!(report.successful_sessions, 2);
        assert_eq!(report.failed_sessions, 1);
        assert_eq!(report.results_summary.len(), 2);
        // Mean of H=1.0 and H=0.0.
        assert!((report.average_entropies["canvas"] - 0.5).abs() < 1e-9);
        assert!(report.filename().starts_with("experiment_report_visit1_"));
    }

    #[test]
    fn report_over_all_failures_has_zero_successes() {
        let results = vec![SessionResult::failed(
            "https://a.example",
            "chrome",
            1,
            "launch".to_string(),
        )];
        let report = SummaryReport::build(&results, 1, vec!["chrome".to_string()], 1, 45);

        assert_eq!(report.successful_sessions, 0);
        assert!(report.average_entropies.is_empty());
    }
}

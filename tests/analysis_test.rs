//! Aggregator tests over synthetic corpora.

use std::collections::BTreeMap;

use fpscope::analysis::{Region, ResultsAggregator, Stability};
use fpscope::entropy::EntropyScore;
use fpscope::probe::{ApiCall, FingerprintLog, ProbeCapture};
use fpscope::results::{ResultStore, SessionResult, SummaryReport};

fn capture(categories: &[(&str, &[&str])]) -> ProbeCapture {
    let mut data = FingerprintLog::new();
    for (category, values) in categories {
        data.insert(
            category.to_string(),
            values
                .iter()
                .map(|v| ApiCall::with_value(serde_json::json!(v)))
                .collect(),
        );
    }
    ProbeCapture {
        data,
        extra: BTreeMap::new(),
    }
}

fn entropies(pairs: &[(&str, f64)]) -> EntropyScore {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

fn session(website: &str, browser: &str, visit: u32, total: f64) -> SessionResult {
    SessionResult::succeeded(
        website,
        browser,
        visit,
        capture(&[("canvas", &["a", "b"])]),
        entropies(&[("canvas", 1.0), ("total", total)]),
    )
}

#[test]
fn top_n_is_stable_and_excludes_failures() {
    let corpus = vec![
        session("https://first.example", "chrome", 1, 3.0),
        session("https://second.example", "chrome", 1, 3.0),
        session("https://third.example", "chrome", 1, 5.0),
        SessionResult::failed("https://broken.example", "chrome", 1, "crash".to_string()),
    ];
    let aggregator = ResultsAggregator::new(corpus);

    let top = aggregator.top_sites(10);
    assert_eq!(top.len(), 3);
    assert_eq!(top[0].website, "https://third.example");
    // Tie between first and second keeps corpus order.
    assert_eq!(top[1].website, "https://first.example");
    assert_eq!(top[2].website, "https://second.example");

    let top_two = aggregator.top_sites(2);
    assert_eq!(top_two.len(), 2);
}

#[test]
fn temporal_tiers_match_the_bit_thresholds() {
    let tiered = [(0.3, Stability::High), (1.0, Stability::Medium), (3.0, Stability::Low)];

    for (delta, expected) in tiered {
        let corpus = vec![
            session("https://a.example", "chrome", 1, 4.0),
            session("https://a.example", "chrome", 2, 4.0 + delta),
        ];
        let cmp = ResultsAggregator::new(corpus).temporal_comparison().unwrap();

        assert!((cmp.delta - delta).abs() < 1e-9);
        assert_eq!(cmp.stability, expected, "delta of {delta} bits");
    }
}

#[test]
fn temporal_comparison_requires_both_visits() {
    let corpus = vec![session("https://a.example", "chrome", 1, 4.0)];
    assert!(ResultsAggregator::new(corpus).temporal_comparison().is_none());
}

#[test]
fn technique_prevalence_counts_calls_and_distinct_sites() {
    let corpus = vec![
        SessionResult::succeeded(
            "https://a.example",
            "chrome",
            1,
            capture(&[("canvas", &["a", "b", "c"]), ("audio", &["x"])]),
            entropies(&[("total", 1.0)]),
        ),
        SessionResult::succeeded(
            "https://b.example",
            "chrome",
            1,
            capture(&[("canvas", &["a"]), ("webgl", &[])]),
            entropies(&[("total", 1.0)]),
        ),
    ];
    let aggregator = ResultsAggregator::new(corpus);

    let usage = aggregator.technique_prevalence();
    assert_eq!(usage[0].category, "canvas");
    assert_eq!(usage[0].call_count, 4);
    assert_eq!(usage[0].site_count, 2);
    assert_eq!(usage[0].total_sites, 2);
    assert!((usage[0].prevalence_pct() - 100.0).abs() < 1e-9);

    let audio = usage.iter().find(|u| u.category == "audio").unwrap();
    assert_eq!(audio.call_count, 1);
    assert_eq!(audio.site_count, 1);

    // Empty call lists do not count as technique use.
    assert!(!usage.iter().any(|u| u.category == "webgl"));
}

#[test]
fn browser_comparison_summarizes_total_entropy() {
    let corpus = vec![
        session("https://a.example", "chrome", 1, 2.0),
        session("https://b.example", "chrome", 1, 4.0),
        session("https://a.example", "edge", 1, 5.0),
    ];
    let stats = ResultsAggregator::new(corpus).browser_comparison();

    let chrome = stats.iter().find(|s| s.browser == "chrome").unwrap();
    assert_eq!(chrome.sessions, 2);
    assert!((chrome.mean_total - 3.0).abs() < 1e-9);
    assert_eq!(chrome.min_total, 2.0);
    assert_eq!(chrome.max_total, 4.0);

    let edge = stats.iter().find(|s| s.browser == "edge").unwrap();
    assert_eq!(edge.sessions, 1);
}

#[test]
fn geography_buckets_by_domain_suffix() {
    let corpus = vec![
        session("https://www.spiegel.de", "chrome", 1, 1.0),
        session("https://www.lemonde.fr", "chrome", 1, 3.0),
        session("https://www.rakuten.jp", "chrome", 1, 2.0),
        session("https://www.example.com", "chrome", 1, 4.0),
        session("https://example.io", "chrome", 1, 5.0),
    ];
    let regions = ResultsAggregator::new(corpus).geography();

    let europe = regions.iter().find(|r| r.region == Region::Europe).unwrap();
    assert_eq!(europe.sessions, 2);
    assert!((europe.mean_total - 2.0).abs() < 1e-9);

    let asia = regions.iter().find(|r| r.region == Region::Asia).unwrap();
    assert_eq!(asia.sessions, 1);

    let na = regions
        .iter()
        .find(|r| r.region == Region::NorthAmerica)
        .unwrap();
    assert_eq!(na.sessions, 1);

    let other = regions.iter().find(|r| r.region == Region::Other).unwrap();
    assert_eq!(other.sessions, 1);
}

#[test]
fn category_stats_sorted_descending_by_mean() {
    let corpus = vec![
        SessionResult::succeeded(
            "https://a.example",
            "chrome",
            1,
            capture(&[]),
            entropies(&[("canvas", 1.0), ("webgl", 3.0), ("total", 3.5)]),
        ),
        SessionResult::succeeded(
            "https://b.example",
            "chrome",
            1,
            capture(&[]),
            entropies(&[("canvas", 2.0), ("webgl", 5.0), ("total", 5.5)]),
        ),
    ];
    let aggregator = ResultsAggregator::new(corpus);

    let stats = aggregator.category_stats();
    assert_eq!(stats[0].category, "webgl");
    assert!((stats[0].mean - 4.0).abs() < 1e-9);
    assert_eq!(stats[0].min, 3.0);
    assert_eq!(stats[0].max, 5.0);
    assert_eq!(stats[1].category, "canvas");
    // The pooled total never shows up as a category.
    assert!(!stats.iter().any(|s| s.category == "total"));

    let total = aggregator.total_stats().unwrap();
    assert!((total.mean - 4.5).abs() < 1e-9);
}

#[test]
fn csv_export_has_fixed_columns_and_successful_rows_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.csv");

    let corpus = vec![
        SessionResult::succeeded(
            "https://a.example",
            "chrome",
            1,
            capture(&[("canvas", &["a", "b"])]),
            entropies(&[("canvas", 1.0), ("fonts", 2.0), ("total", 2.5)]),
        ),
        SessionResult::failed("https://b.example", "edge", 1, "timeout".to_string()),
    ];
    let rows = ResultsAggregator::new(corpus).export_csv(&path).unwrap();
    assert_eq!(rows, 1);

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        "Website,Browser,Visit,Timestamp,Total_Entropy,Canvas_Entropy,WebGL_Entropy,Audio_Entropy,Navigator_Entropy,Success"
    );

    let fields: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(fields.len(), 10);
    assert_eq!(fields[0], "https://a.example");
    assert_eq!(fields[4], "2.500000");
    // Unknown categories (fonts) are omitted from this export; absent known
    // categories render as zero.
    assert_eq!(fields[6], "0.000000");
    assert_eq!(fields[9], "true");
}

#[test]
fn aggregator_reads_back_a_persisted_corpus_without_reports() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::new(dir.path()).unwrap();

    let results = vec![
        session("https://a.example", "chrome", 1, 2.0),
        SessionResult::failed("https://b.example", "edge", 1, "x".to_string()),
    ];
    for result in &results {
        store.save_session(result).unwrap();
    }
    let report = SummaryReport::build(&results, 1, vec!["chrome".to_string()], 2, 45);
    store.save_report(&report).unwrap();

    let aggregator = ResultsAggregator::from_store(&store).unwrap();
    let overall = aggregator.overall();

    assert_eq!(overall.total_sessions, 2);
    assert_eq!(overall.successful_sessions, 1);
    assert_eq!(overall.failed_sessions, 1);
    assert_eq!(
        overall.sessions_per_browser,
        vec![("chrome".to_string(), 1), ("edge".to_string(), 1)]
    );
    assert_eq!(overall.sessions_per_visit, vec![(1, 2)]);
}

//! Offline aggregation over the persisted session corpus.
//!
//! Every view is a pure projection: the aggregator never mutates the corpus
//! and never includes failed sessions in entropy-based rankings. It runs as
//! a separate step after an experiment, reading only what has already been
//! flushed to the results directory.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::entropy::TOTAL_KEY;
use crate::error::{FpscopeError, Result};
use crate::results::{ResultStore, SessionResult};

/// Suffix lists for the coarse geography bucketing. Matching on the domain
/// suffix says nothing about where a site is actually hosted; the buckets
/// are approximate by construction and reported as such.
const EUROPE_SUFFIXES: &[&str] = &[".de", ".fr", ".uk", ".es", ".it", ".nl", ".be", ".ch", ".at"];
const ASIA_SUFFIXES: &[&str] = &[".cn", ".jp", ".kr", ".in", ".sg"];

/// Categories with dedicated columns in the tabular export. Other
/// categories stay available in the JSON records.
pub const EXPORT_CATEGORIES: &[&str] = &["canvas", "webgl", "audio", "navigator"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverallStats {
    pub total_sessions: usize,
    pub successful_sessions: usize,
    pub failed_sessions: usize,
    pub sessions_per_browser: Vec<(String, usize)>,
    pub sessions_per_visit: Vec<(u32, usize)>,
}

#[derive(Debug, Clone)]
pub struct CategoryStats {
    pub category: String,
    pub sessions: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone)]
pub struct SiteRanking {
    pub website: String,
    pub browser: String,
    pub visit_number: u32,
    pub total_entropy: f64,
}

#[derive(Debug, Clone)]
pub struct TechniqueUsage {
    pub category: String,
    pub call_count: usize,
    pub site_count: usize,
    pub total_sites: usize,
}

impl TechniqueUsage {
    pub fn prevalence_pct(&self) -> f64 {
        if self.total_sites == 0 {
            0.0
        } else {
            self.site_count as f64 / self.total_sites as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserStats {
    pub browser: String,
    pub sessions: usize,
    pub mean_total: f64,
    pub min_total: f64,
    pub max_total: f64,
}

/// Three-tier stability classification of the mean total-entropy delta
/// between visits. A reporting heuristic, not a statistical test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    High,
    Medium,
    Low,
}

impl Stability {
    pub fn classify(delta_bits: f64) -> Self {
        let delta = delta_bits.abs();
        if delta < 0.5 {
            Stability::High
        } else if delta < 2.0 {
            Stability::Medium
        } else {
            Stability::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stability::High => "high",
            Stability::Medium => "medium",
            Stability::Low => "low",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisitStats {
    pub visit_number: u32,
    pub sessions: usize,
    pub mean_total: f64,
}

#[derive(Debug, Clone)]
pub struct TemporalComparison {
    pub first: VisitStats,
    pub second: VisitStats,
    /// second minus first, in bits.
    pub delta: f64,
    pub stability: Stability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Region {
    Europe,
    NorthAmerica,
    Asia,
    Other,
}

impl Region {
    pub fn label(&self) -> &'static str {
        match self {
            Region::Europe => "Europe",
            Region::NorthAmerica => "North America",
            Region::Asia => "Asia",
            Region::Other => "Other",
        }
    }

    /// Bucket a website URL by its host's domain suffix.
    pub fn classify(website: &str) -> Self {
        let host = host_of(website);

        if EUROPE_SUFFIXES.iter().any(|s| host.ends_with(s)) {
            Region::Europe
        } else if ASIA_SUFFIXES.iter().any(|s| host.ends_with(s)) {
            Region::Asia
        } else if host.ends_with(".com") || host.ends_with(".org") {
            Region::NorthAmerica
        } else {
            Region::Other
        }
    }
}

fn host_of(website: &str) -> &str {
    let stripped = website
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = stripped.split('/').next().unwrap_or(stripped);
    host.split(':').next().unwrap_or(host)
}

#[derive(Debug, Clone)]
pub struct RegionStats {
    pub region: Region,
    pub sessions: usize,
    pub mean_total: f64,
}

pub struct ResultsAggregator {
    results: Vec<SessionResult>,
}

impl ResultsAggregator {
    pub fn new(results: Vec<SessionResult>) -> Self {
        Self { results }
    }

    pub fn from_store(store: &ResultStore) -> Result<Self> {
        Ok(Self::new(store.load_sessions()?))
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn successful(&self) -> impl Iterator<Item = &SessionResult> {
        self.results.iter().filter(|r| r.success)
    }

    /// Success/failure counts plus per-browser and per-visit breakdowns.
    pub fn overall(&self) -> OverallStats {
        let successful = self.successful().count();

        let mut per_browser: BTreeMap<String, usize> = BTreeMap::new();
        let mut per_visit: BTreeMap<u32, usize> = BTreeMap::new();
        for result in &self.results {
            *per_browser.entry(result.browser.clone()).or_insert(0) += 1;
            *per_visit.entry(result.visit_number).or_insert(0) += 1;
        }

        OverallStats {
            total_sessions: self.results.len(),
            successful_sessions: successful,
            failed_sessions: self.results.len() - successful,
            sessions_per_browser: per_browser.into_iter().collect(),
            sessions_per_visit: per_visit.into_iter().collect(),
        }
    }

    /// Per-category entropy statistics over successful sessions, sorted
    /// descending by mean. The pooled `total` is reported separately via
    /// [`Self::total_stats`].
    pub fn category_stats(&self) -> Vec<CategoryStats> {
        let mut stats: Vec<CategoryStats> = self
            .collect_category_values()
            .into_iter()
            .filter(|(category, _)| category != TOTAL_KEY)
            .map(|(category, values)| summarize(category, &values))
            .collect();

        stats.sort_by(|a, b| b.mean.partial_cmp(&a.mean).unwrap_or(Ordering::Equal));
        stats
    }

    pub fn total_stats(&self) -> Option<CategoryStats> {
        self.collect_category_values()
            .remove(TOTAL_KEY)
            .map(|values| summarize(TOTAL_KEY.to_string(), &values))
    }

    fn collect_category_values(&self) -> BTreeMap<String, Vec<f64>> {
        let mut by_category: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for result in self.successful() {
            if let Some(ref entropies) = result.entropies {
                for (category, value) in entropies {
                    by_category.entry(category.clone()).or_default().push(*value);
                }
            }
        }
        by_category
    }

    /// The `n` most fingerprinting-heavy sessions by total entropy. The
    /// sort is stable, so ties keep the corpus read order, and failed
    /// sessions never appear.
    pub fn top_sites(&self, n: usize) -> Vec<SiteRanking> {
        let mut ranked: Vec<SiteRanking> = self
            .successful()
            .map(|r| SiteRanking {
                website: r.website.clone(),
                browser: r.browser.clone(),
                visit_number: r.visit_number,
                total_entropy: r.total_entropy(),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.total_entropy
                .partial_cmp(&a.total_entropy)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(n);
        ranked
    }

    /// Which fingerprinting techniques sites actually exercise: total call
    /// count per category and how many distinct sites used it, sorted
    /// descending by call count.
    pub fn technique_prevalence(&self) -> Vec<TechniqueUsage> {
        let mut call_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut sites: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
        let mut all_sites: BTreeSet<&str> = BTreeSet::new();

        for result in self.successful() {
            let capture = match result.fingerprint_data {
                Some(ref c) => c,
                None => continue,
            };
            all_sites.insert(&result.website);

            for (category, calls) in &capture.data {
                if calls.is_empty() {
                    continue;
                }
                *call_counts.entry(category.clone()).or_insert(0) += calls.len();
                sites
                    .entry(category.clone())
                    .or_default()
                    .insert(&result.website);
            }
        }

        let total_sites = all_sites.len();
        let mut usage: Vec<TechniqueUsage> = call_counts
            .into_iter()
            .map(|(category, call_count)| TechniqueUsage {
                site_count: sites.get(&category).map(BTreeSet::len).unwrap_or(0),
                category,
                call_count,
                total_sites,
            })
            .collect();

        usage.sort_by(|a, b| b.call_count.cmp(&a.call_count));
        usage
    }

    /// Per-browser mean/min/max of total entropy.
    pub fn browser_comparison(&self) -> Vec<BrowserStats> {
        let mut by_browser: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for result in self.successful() {
            by_browser
                .entry(result.browser.clone())
                .or_default()
                .push(result.total_entropy());
        }

        by_browser
            .into_iter()
            .map(|(browser, values)| {
                let s = summarize(browser, &values);
                BrowserStats {
                    browser: s.category,
                    sessions: s.sessions,
                    mean_total: s.mean,
                    min_total: s.min,
                    max_total: s.max,
                }
            })
            .collect()
    }

    /// Mean total entropy at visit 1 vs visit 2 with the stability tier.
    /// `None` until the corpus contains successful sessions of both visits.
    pub fn temporal_comparison(&self) -> Option<TemporalComparison> {
        let mut by_visit: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for result in self.successful() {
            by_visit
                .entry(result.visit_number)
                .or_default()
                .push(result.total_entropy());
        }

        let first = by_visit.get(&1)?;
        let second = by_visit.get(&2)?;
        let first_mean = mean(first);
        let second_mean = mean(second);
        let delta = second_mean - first_mean;

        Some(TemporalComparison {
            first: VisitStats {
                visit_number: 1,
                sessions: first.len(),
                mean_total: first_mean,
            },
            second: VisitStats {
                visit_number: 2,
                sessions: second.len(),
                mean_total: second_mean,
            },
            delta,
            stability: Stability::classify(delta),
        })
    }

    /// Mean total entropy per coarse geography bucket. Buckets with no
    /// sessions are omitted.
    pub fn geography(&self) -> Vec<RegionStats> {
        let mut by_region: BTreeMap<Region, Vec<f64>> = BTreeMap::new();
        for result in self.successful() {
            by_region
                .entry(Region::classify(&result.website))
                .or_default()
                .push(result.total_entropy());
        }

        by_region
            .into_iter()
            .map(|(region, values)| RegionStats {
                region,
                sessions: values.len(),
                mean_total: mean(&values),
            })
            .collect()
    }

    /// Write the flat per-session table for spreadsheet and statistics
    /// tooling: one row per successful session, fixed column set. Returns
    /// the number of rows written.
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        let mut out = String::from(
            "Website,Browser,Visit,Timestamp,Total_Entropy,Canvas_Entropy,WebGL_Entropy,Audio_Entropy,Navigator_Entropy,Success\n",
        );

        let mut rows = 0usize;
        for result in self.successful() {
            let mut fields = vec![
                csv_field(&result.website),
                csv_field(&result.browser),
                result.visit_number.to_string(),
                csv_field(&result.timestamp.to_rfc3339()),
                format_bits(result.total_entropy()),
            ];
            for category in EXPORT_CATEGORIES {
                fields.push(format_bits(result.entropy_for(category)));
            }
            fields.push("true".to_string());

            out.push_str(&fields.join(","));
            out.push('\n');
            rows += 1;
        }

        fs::write(path, out).map_err(|e| {
            FpscopeError::StorageError(format!("cannot write {}: {e}", path.display()))
        })?;
        Ok(rows)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn summarize(category: String, values: &[f64]) -> CategoryStats {
    CategoryStats {
        category,
        sessions: values.len(),
        mean: mean(values),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

fn format_bits(value: f64) -> String {
    format!("{value:.6}")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stability_tiers() {
        assert_eq!(Stability::classify(0.3), Stability::High);
        assert_eq!(Stability::classify(-0.3), Stability::High);
        assert_eq!(Stability::classify(0.5), Stability::Medium);
        assert_eq!(Stability::classify(1.0), Stability::Medium);
        assert_eq!(Stability::classify(2.0), Stability::Low);
        assert_eq!(Stability::classify(3.0), Stability::Low);
    }

    #[test]
    fn region_classification_uses_host_suffix() {
        assert_eq!(Region::classify("https://www.spiegel.de"), Region::Europe);
        assert_eq!(Region::classify("https://www.bbc.co.uk/news"), Region::Europe);
        assert_eq!(Region::classify("https://www.rakuten.jp"), Region::Asia);
        assert_eq!(
            Region::classify("https://www.example.com"),
            Region::NorthAmerica
        );
        assert_eq!(Region::classify("https://example.io"), Region::Other);
        // Suffix matching, not substring: an ".in"-looking name inside the
        // host must not bucket as Asia.
        assert_eq!(
            Region::classify("https://www.linkedin.com"),
            Region::NorthAmerica
        );
    }

    #[test]
    fn csv_fields_with_commas_are_quoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}

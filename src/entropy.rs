//! Shannon-entropy scoring of captured fingerprinting activity.
//!
//! Pure computation, no I/O. The headline metric is the `total` entry of
//! [`attribute_entropies`]: entropy over the pooled values of every
//! category, which is what cross-site comparisons rank by. Entropy is not
//! additive across categories, so `total` is never the sum or mean of the
//! per-category scores.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::probe::FingerprintLog;

/// Reserved key in an [`EntropyScore`] for the pooled all-category score.
pub const TOTAL_KEY: &str = "total";

/// Category name -> entropy in bits, plus the reserved `total` entry.
pub type EntropyScore = BTreeMap<String, f64>;

/// Shannon entropy H = -sum p(x) * log2(p(x)) over the empirical
/// distribution of `values`, in bits.
///
/// An empty slice has zero information content and scores 0.0. The result
/// is never negative and does not depend on input order.
pub fn shannon_entropy(values: &[String]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *freq.entry(value.as_str()).or_insert(0) += 1;
    }

    let total = values.len() as f64;
    freq.values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Per-category and pooled entropy for one session's fingerprint log.
///
/// Categories with recorded calls but no extractable `value` score 0.0.
/// The `total` entry pools the raw stringified values of all categories
/// without tagging them by category, so identical values observed in two
/// categories collapse into one distribution symbol.
pub fn attribute_entropies(log: &FingerprintLog) -> EntropyScore {
    let mut entropies = EntropyScore::new();
    let mut all_values: Vec<String> = Vec::new();

    for (category, calls) in log {
        let values: Vec<String> = calls
            .iter()
            .filter_map(|call| call.value_string())
            .collect();

        entropies.insert(category.clone(), shannon_entropy(&values));
        all_values.extend(values);
    }

    entropies.insert(TOTAL_KEY.to_string(), shannon_entropy(&all_values));
    entropies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ApiCall;

    const TOLERANCE: f64 = 1e-9;

    fn values(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn log_from(entries: &[(&str, &[&str])]) -> FingerprintLog {
        entries
            .iter()
            .map(|(category, vals)| {
                let calls = vals
                    .iter()
                    .map(|v| ApiCall::with_value(serde_json::json!(v)))
                    .collect();
                (category.to_string(), calls)
            })
            .collect()
    }

    #[test]
    fn empty_sequence_scores_zero() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn identical_values_score_zero() {
        for n in 1..=5 {
            let vals = vec!["same".to_string(); n];
            assert_eq!(shannon_entropy(&vals), 0.0);
        }
    }

    #[test]
    fn uniform_distinct_values_score_log2_n() {
        for n in [2usize, 4, 8, 16] {
            let vals: Vec<String> = (0..n).map(|i| format!("v{i}")).collect();
            let expected = (n as f64).log2();
            assert!((shannon_entropy(&vals) - expected).abs() < TOLERANCE);
        }
    }

    #[test]
    fn entropy_is_permutation_invariant() {
        let a = values(&["x", "x", "y", "z", "z", "z"]);
        let b = values(&["z", "y", "z", "x", "z", "x"]);
        assert!((shannon_entropy(&a) - shannon_entropy(&b)).abs() < TOLERANCE);
    }

    #[test]
    fn entropy_is_never_negative() {
        let vals = values(&["a", "a", "a", "b"]);
        assert!(shannon_entropy(&vals) >= 0.0);
    }

    #[test]
    fn entropy_is_bounded_by_log2_distinct() {
        let vals = values(&["a", "a", "b", "b", "b", "c"]);
        assert!(shannon_entropy(&vals) <= 3f64.log2() + TOLERANCE);
    }

    #[test]
    fn empty_log_yields_only_zero_total() {
        let entropies = attribute_entropies(&FingerprintLog::new());
        assert_eq!(entropies.len(), 1);
        assert_eq!(entropies.get(TOTAL_KEY), Some(&0.0));
    }

    #[test]
    fn category_without_values_scores_zero() {
        let mut log = FingerprintLog::new();
        log.insert("screen".to_string(), vec![ApiCall::without_value()]);

        let entropies = attribute_entropies(&log);
        assert_eq!(entropies.get("screen"), Some(&0.0));
        assert_eq!(entropies.get(TOTAL_KEY), Some(&0.0));
    }

    #[test]
    fn total_pools_values_instead_of_summing_categories() {
        // Two one-value categories each have zero entropy, but their pooled
        // distribution does not.
        let log = log_from(&[("canvas", &["aaa"]), ("webgl", &["bbb"])]);
        let entropies = attribute_entropies(&log);

        assert_eq!(entropies["canvas"], 0.0);
        assert_eq!(entropies["webgl"], 0.0);
        assert!((entropies[TOTAL_KEY] - 1.0).abs() < TOLERANCE);
        assert_ne!(
            entropies[TOTAL_KEY],
            entropies["canvas"] + entropies["webgl"] + 0.5
        );
    }

    #[test]
    fn end_to_end_example_log() {
        let log = log_from(&[("canvas", &["a", "a", "b"]), ("webgl", &["x"])]);
        let entropies = attribute_entropies(&log);

        // H([a, a, b]) = 2/3*log2(3/2) + 1/3*log2(3)
        assert!((entropies["canvas"] - 0.9182958340544896).abs() < TOLERANCE);
        assert_eq!(entropies["webgl"], 0.0);
        // H([a, a, b, x]) = 1/2*1 + 1/4*2 + 1/4*2
        assert!((entropies[TOTAL_KEY] - 1.5).abs() < TOLERANCE);
    }

    #[test]
    fn numeric_values_are_stringified() {
        let mut log = FingerprintLog::new();
        log.insert(
            "navigator".to_string(),
            vec![
                ApiCall::with_value(serde_json::json!(8)),
                ApiCall::with_value(serde_json::json!("8")),
            ],
        );

        // Number 8 and string "8" stringify to the same symbol.
        let entropies = attribute_entropies(&log);
        assert_eq!(entropies["navigator"], 0.0);
    }
}

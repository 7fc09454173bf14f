use std::path::PathBuf;

use colored::Colorize;

use crate::analysis::ResultsAggregator;
use crate::cli::Cli;
use crate::commands::load_config;
use crate::error::Result;
use crate::results::ResultStore;

pub async fn run(cli: &Cli, top: usize, csv: Option<&str>) -> Result<()> {
    let config = load_config(cli)?;
    let results_dir = config.results_dir_path();

    let store = ResultStore::new(&results_dir)?;
    let aggregator = ResultsAggregator::from_store(&store)?;

    println!("{}", "FINGERPRINTING ANALYSIS REPORT".bold());
    println!("Results directory: {}", results_dir.display());

    if aggregator.is_empty() {
        println!();
        println!(
            "{}",
            "No session records found. Run the experiment first.".yellow()
        );
        return Ok(());
    }

    print_overall(&aggregator);
    print_entropy(&aggregator);
    print_top_sites(&aggregator, top);
    print_techniques(&aggregator);
    print_browsers(&aggregator);
    print_temporal(&aggregator);
    print_geography(&aggregator);

    let csv_path = match csv {
        Some(path) => PathBuf::from(path),
        None => results_dir.join("results_summary.csv"),
    };
    let rows = aggregator.export_csv(&csv_path)?;
    println!();
    println!(
        "{} {} rows exported to {}",
        "Summary table:".bold(),
        rows,
        csv_path.display()
    );

    Ok(())
}

fn section(title: &str) {
    println!();
    println!("{}", title.bold().cyan());
    println!("{}", "-".repeat(70));
}

fn print_overall(aggregator: &ResultsAggregator) {
    let stats = aggregator.overall();
    section("OVERALL STATISTICS");

    let pct = |count: usize| {
        if stats.total_sessions == 0 {
            0.0
        } else {
            count as f64 / stats.total_sessions as f64 * 100.0
        }
    };

    println!("Total sessions: {}", stats.total_sessions);
    println!(
        "  {} successful ({:.1}%)",
        stats.successful_sessions.to_string().green(),
        pct(stats.successful_sessions)
    );
    println!(
        "  {} failed ({:.1}%)",
        stats.failed_sessions.to_string().red(),
        pct(stats.failed_sessions)
    );

    println!("Sessions per browser:");
    for (browser, count) in &stats.sessions_per_browser {
        println!("  {browser:<12} {count}");
    }
    println!("Sessions per visit:");
    for (visit, count) in &stats.sessions_per_visit {
        println!("  visit {visit:<6} {count}");
    }
}

fn print_entropy(aggregator: &ResultsAggregator) {
    section("SHANNON ENTROPY BY CATEGORY");
    println!(
        "{:<25} {:>10} {:>10} {:>10} {:>10}",
        "Category", "Sessions", "Mean", "Min", "Max"
    );

    for stats in aggregator.category_stats() {
        println!(
            "{:<25} {:>10} {:>10.2} {:>10.2} {:>10.2}",
            stats.category, stats.sessions, stats.mean, stats.min, stats.max
        );
    }

    if let Some(total) = aggregator.total_stats() {
        println!(
            "{:<25} {:>10} {:>10.2} {:>10.2} {:>10.2}",
            "TOTAL".bold(),
            total.sessions,
            total.mean,
            total.min,
            total.max
        );
    }
}

fn print_top_sites(aggregator: &ResultsAggregator, top: usize) {
    section(&format!("TOP {top} FINGERPRINTING SITES"));
    println!(
        "{:<4} {:<45} {:>10} {:<10}",
        "#", "Site", "Bits", "Browser"
    );

    for (i, ranking) in aggregator.top_sites(top).iter().enumerate() {
        let site = truncate(&ranking.website, 45);
        println!(
            "{:<4} {:<45} {:>10.2} {:<10}",
            i + 1,
            site,
            ranking.total_entropy,
            ranking.browser
        );
    }
}

fn print_techniques(aggregator: &ResultsAggregator) {
    section("FINGERPRINTING TECHNIQUES");
    println!(
        "{:<20} {:>10} {:>8} {:>12}",
        "Technique", "API calls", "Sites", "Prevalence"
    );

    for usage in aggregator.technique_prevalence() {
        println!(
            "{:<20} {:>10} {:>8} {:>11.1}%",
            usage.category,
            usage.call_count,
            format!("{}/{}", usage.site_count, usage.total_sites),
            usage.prevalence_pct()
        );
    }
}

fn print_browsers(aggregator: &ResultsAggregator) {
    section("BROWSER COMPARISON");
    println!(
        "{:<12} {:>10} {:>12} {:>10} {:>10}",
        "Browser", "Sessions", "Mean bits", "Min", "Max"
    );

    for stats in aggregator.browser_comparison() {
        println!(
            "{:<12} {:>10} {:>12.2} {:>10.2} {:>10.2}",
            stats.browser, stats.sessions, stats.mean_total, stats.min_total, stats.max_total
        );
    }
}

fn print_temporal(aggregator: &ResultsAggregator) {
    section("TEMPORAL ANALYSIS (visit 1 vs visit 2)");

    match aggregator.temporal_comparison() {
        Some(cmp) => {
            println!(
                "Visit 1: {} sessions, mean total entropy {:.2} bits",
                cmp.first.sessions, cmp.first.mean_total
            );
            println!(
                "Visit 2: {} sessions, mean total entropy {:.2} bits",
                cmp.second.sessions, cmp.second.mean_total
            );
            println!("Delta: {:+.2} bits", cmp.delta);
            println!(
                "Temporal stability: {} (tiering heuristic, not a statistical test)",
                cmp.stability.label().to_uppercase().bold()
            );
        }
        None => {
            println!("Insufficient data: both visit 1 and visit 2 sessions are required.");
        }
    }
}

fn print_geography(aggregator: &ResultsAggregator) {
    section("GEOGRAPHIC BREAKDOWN (approximate, by domain suffix)");
    println!("{:<15} {:>10} {:>12}", "Region", "Sessions", "Mean bits");

    for stats in aggregator.geography() {
        println!(
            "{:<15} {:>10} {:>12.2}",
            stats.region.label(),
            stats.sessions,
            stats.mean_total
        );
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }

    // The cut must land on a char boundary or slicing panics on
    // multibyte hosts (IDN URLs); back up until it does.
    let mut cut = max.saturating_sub(3);
    while cut > 0 && !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &value[..cut])
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncate_keeps_short_values_intact() {
        assert_eq!(truncate("https://example.org", 45), "https://example.org");
    }

    #[test]
    fn truncate_cuts_long_ascii_values() {
        let url = format!("https://example.org/{}", "a".repeat(60));
        let cut = truncate(&url, 45);
        assert_eq!(cut.len(), 45);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn truncate_backs_up_to_a_char_boundary_on_multibyte_urls() {
        // 14 ASCII bytes then 3-byte chars; byte 42 falls inside one.
        let url = format!("https://xn.jp/{}", "\u{3042}".repeat(20));
        let cut = truncate(&url, 45);

        assert_eq!(cut, format!("https://xn.jp/{}...", "\u{3042}".repeat(9)));
        assert!(cut.len() <= 45);
    }
}

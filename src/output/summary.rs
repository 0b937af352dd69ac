//! Batch summaries for the terminal
//!
//! Renders the per-target report, the deduplicated results sorted by price,
//! and cache statistics.

use crate::batch::{BatchReport, ResultSet, TargetStatus};
use crate::cache::CacheStats;
use crate::model::ProductRecord;
use std::cmp::Ordering;
use std::fmt::Write;

/// Records ordered by ascending price, ties broken by identity
pub fn sorted_by_price(results: &ResultSet) -> Vec<&ProductRecord> {
    let mut records: Vec<_> = results.iter().collect();
    records.sort_by(|a, b| {
        a.price
            .partial_cmp(&b.price)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.identity.cmp(&b.identity))
    });
    records
}

/// Renders the per-target report
pub fn render_report(report: &BatchReport) -> String {
    let mut out = String::new();
    let counts = report.counts();

    let _ = writeln!(out, "=== Batch Report ===\n");
    let _ = writeln!(out, "Targets ({}):", report.targets.len());
    for target in &report.targets {
        let detail = match &target.status {
            TargetStatus::Succeeded {
                accepted, rejected, ..
            } => format!(" ({} accepted, {} rejected)", accepted, rejected),
            TargetStatus::Exhausted { .. } => format!(" ({} attempts)", target.attempts.len()),
            TargetStatus::Skipped | TargetStatus::Cancelled => String::new(),
        };
        let _ = writeln!(out, "  {}: {}{}", target.target, target.status, detail);
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Succeeded: {}, Exhausted: {}, Skipped: {}, Cancelled: {}",
        counts.succeeded, counts.exhausted, counts.skipped, counts.cancelled
    );
    out
}

/// Renders the deduplicated results, cheapest first
pub fn render_results(results: &ResultSet) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Results ({} unique) ===\n", results.len());
    for record in sorted_by_price(results) {
        let _ = write!(
            out,
            "  {:>12} {} {:.2}  {}",
            record.identity, record.currency, record.price, record.title
        );
        if let Some(rating) = record.rating {
            let _ = write!(out, "  [{:.1}", rating);
            match record.review_count {
                Some(reviews) => {
                    let _ = write!(out, ", {} reviews]", reviews);
                }
                None => out.push(']'),
            }
        }
        let _ = writeln!(out, "  via {}", record.raw_source_strategy);
        if let Some(url) = &record.url {
            let _ = writeln!(out, "               {}", url);
        }
    }
    out
}

/// Prints the report followed by the results
pub fn print_report(report: &BatchReport) {
    println!("{}", render_report(report));
    println!("{}", render_results(&report.results));
}

/// Prints cache statistics
///
/// # Arguments
///
/// * `location` - Where the cache lives, for display
/// * `stats` - Entry counts
pub fn print_cache_stats(location: &str, stats: &CacheStats) {
    println!("=== Cache Statistics ===\n");
    println!("Cache: {}", location);
    println!("  Total entries: {}", stats.total);
    println!("  Fresh: {}", stats.fresh);
    println!("  Expired: {}", stats.expired);
}

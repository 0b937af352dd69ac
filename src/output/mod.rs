//! Output module for batch summaries
//!
//! This module handles:
//! - Printing the per-target report
//! - Printing deduplicated results sorted by price
//! - Printing cache statistics

pub mod summary;

pub use summary::{print_cache_stats, print_report, render_report, render_results, sorted_by_price};

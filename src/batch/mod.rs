//! Batch execution over many fetch targets
//!
//! This module contains:
//! - Bounded, failure-isolated concurrent execution of funnel runs
//! - Deduplication of accepted records by product identity
//! - The per-target report handed to the output layer

mod coordinator;
mod report;
mod result_set;

pub use coordinator::BatchCoordinator;
pub use report::{BatchReport, StatusCounts, TargetReport, TargetStatus};
pub use result_set::ResultSet;

//! The resilience funnel
//!
//! This module drives a single fetch target through the strategy list:
//! - Trying strategies strictly in priority order
//! - Retrying transient failures with exponential backoff and jitter
//! - Escalating repeated bot challenges to the next strategy
//! - Validating payloads and writing accepted results through to the cache
//! - Abandoning the run promptly on cancellation

mod backoff;
mod orchestrator;

pub use backoff::BackoffPolicy;
pub use orchestrator::{AttemptRecord, Funnel, FunnelBuilder, FunnelOutcome};

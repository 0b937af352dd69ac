//! Core data model for the funnel
//!
//! # Components
//!
//! - `FetchTarget` / `Platform`: what is being retrieved
//! - `RawListing` / `RawPayload`: what a strategy hands back before validation
//! - `ProductRecord`: a validated, immutable listing
//! - `StrategyKind` / `StrategyOutcome` / `FailureReason`: how an attempt went

mod listing;
mod outcome;
mod target;

// Re-export main types
pub use listing::{ProductRecord, RawListing, RawPayload, RawPrice};
pub use outcome::{ChallengeKind, FailureReason, StrategyKind, StrategyOutcome};
pub use target::{FetchTarget, Platform};

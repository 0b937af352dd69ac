//! Listing-Funnel: a resilient product listing fetcher
//!
//! This crate retrieves e-commerce search result pages through an ordered
//! funnel of retrieval strategies (cache, structured API, desktop and mobile
//! HTTP profiles, headless browser), stopping at the first strategy whose
//! output passes validation. Accepted listings are cached, deduplicated by
//! product identity, and reported per fetch target.

pub mod batch;
pub mod cache;
pub mod config;
pub mod funnel;
pub mod model;
pub mod output;
pub mod strategy;
pub mod validate;

use thiserror::Error;

/// Main error type for Listing-Funnel operations
///
/// Strategy failures never show up here: they are classified and recovered
/// inside the funnel. This covers setting a funnel up.
#[derive(Debug, Error)]
pub enum FunnelError {
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown strategy name: {0}")]
    UnknownStrategy(String),
}

/// Result type alias for Listing-Funnel operations
pub type Result<T> = std::result::Result<T, FunnelError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use batch::{BatchCoordinator, BatchReport, ResultSet, TargetReport, TargetStatus};
pub use cache::{CacheEntry, CacheKey, CacheStore, MemoryCache, SqliteCache};
pub use config::Config;
pub use funnel::{BackoffPolicy, Funnel, FunnelOutcome};
pub use model::{FetchTarget, Platform, ProductRecord, RawListing, StrategyKind, StrategyOutcome};
pub use validate::{ValidationError, Validator};

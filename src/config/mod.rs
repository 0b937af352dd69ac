//! Configuration module for listing-funnel
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use listing_funnel::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("funnel.toml")).unwrap();
//! println!("Funnel will run {} targets", config.targets().len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, CacheConfig, Config, DebugConfig, EndpointsConfig, FunnelConfig, HttpConfig,
    RetryConfig, SearchEntry,
};
pub use validation::{MAX_ATTEMPTS, MAX_PAGES};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

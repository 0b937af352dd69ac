use crate::model::{FetchTarget, Platform, StrategyKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for listing-funnel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub funnel: FunnelConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub search: Vec<SearchEntry>,
}

impl Config {
    /// Expands every `[[search]]` entry into one target per page, in declaration order
    pub fn targets(&self) -> Vec<FetchTarget> {
        self.search
            .iter()
            .flat_map(|entry| {
                (1..=entry.pages).map(move |page| {
                    let target = FetchTarget::new(entry.platform, entry.query.clone(), page);
                    match &entry.region {
                        Some(region) => target.with_region(region.clone()),
                        None => target,
                    }
                })
            })
            .collect()
    }
}

/// Funnel and batch behavior
#[derive(Debug, Clone, Deserialize)]
pub struct FunnelConfig {
    /// Maximum number of targets processed at once
    #[serde(rename = "max-concurrent-targets", default = "default_max_concurrent_targets")]
    pub max_concurrent_targets: u32,

    /// Bot challenges tolerated per strategy before giving up on it
    #[serde(rename = "challenge-limit", default = "default_challenge_limit")]
    pub challenge_limit: u32,

    /// Skip later pages of a search whose first page came back exhausted
    #[serde(rename = "stop-after-empty-first-page", default = "default_true")]
    pub stop_after_empty_first_page: bool,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            max_concurrent_targets: default_max_concurrent_targets(),
            challenge_limit: default_challenge_limit(),
            stop_after_empty_first_page: true,
        }
    }
}

/// Retry and backoff policy
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per strategy, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(rename = "jitter-ms", default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Per-strategy overrides of `max-attempts`, keyed by strategy name
    #[serde(rename = "per-strategy", default)]
    pub per_strategy: HashMap<String, u32>,
}

impl RetryConfig {
    /// Attempts allowed for a strategy
    ///
    /// The cache is consulted exactly once.
    pub fn max_attempts_for(&self, kind: StrategyKind) -> u32 {
        if kind == StrategyKind::Cached {
            return 1;
        }
        self.per_strategy
            .get(kind.config_name())
            .copied()
            .unwrap_or(self.max_attempts)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            per_strategy: HashMap::new(),
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite cache file
    #[serde(default = "default_cache_path")]
    pub path: String,

    /// Keep results across runs; when false the cache lives in memory only
    #[serde(default = "default_true")]
    pub persist: bool,

    /// How long an accepted result stays reusable
    #[serde(rename = "ttl-secs", default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            persist: true,
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Headless browser configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Use a headless browser for the stealth strategy (requires the `browser` feature)
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "navigation-timeout-secs", default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// Pause after navigation so scripted content can render
    #[serde(rename = "settle-ms", default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            navigation_timeout_secs: default_navigation_timeout_secs(),
            settle_ms: default_settle_ms(),
        }
    }
}

/// Base URLs of the sites and APIs queried
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_amazon")]
    pub amazon: String,

    #[serde(rename = "mercadolibre-listings", default = "default_mercadolibre_listings")]
    pub mercadolibre_listings: String,

    #[serde(rename = "mercadolibre-api", default = "default_mercadolibre_api")]
    pub mercadolibre_api: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            amazon: default_amazon(),
            mercadolibre_listings: default_mercadolibre_listings(),
            mercadolibre_api: default_mercadolibre_api(),
        }
    }
}

/// Diagnostics
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConfig {
    /// Directory receiving copies of challenge and unparseable pages
    #[serde(rename = "save-pages-dir", default)]
    pub save_pages_dir: Option<PathBuf>,
}

/// One search to run
#[derive(Debug, Clone, Deserialize)]
pub struct SearchEntry {
    pub platform: Platform,

    pub query: String,

    /// Number of result pages, starting from page 1
    #[serde(default = "default_pages")]
    pub pages: u32,

    /// Country code (MercadoLibre site selection)
    #[serde(default)]
    pub region: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_targets() -> u32 {
    4
}

fn default_challenge_limit() -> u32 {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    500
}

fn default_cache_path() -> String {
    "listing-cache.db".to_string()
}

fn default_ttl_secs() -> u64 {
    4 * 60 * 60
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_navigation_timeout_secs() -> u64 {
    45
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_amazon() -> String {
    "https://www.amazon.com".to_string()
}

fn default_mercadolibre_listings() -> String {
    "https://listado.mercadolibre.com.co".to_string()
}

fn default_mercadolibre_api() -> String {
    "https://api.mercadolibre.com".to_string()
}

fn default_pages() -> u32 {
    1
}

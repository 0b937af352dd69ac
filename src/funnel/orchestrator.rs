//! Funnel orchestrator
//!
//! Drives one fetch target through the ordered strategy list:
//!
//! ```text
//! Idle -> TryingStrategy(0) -> TryingStrategy(1) -> ... -> Exhausted
//!               |                    |
//!               +--------------------+--> Succeeded
//! ```
//!
//! Any state may move to `Cancelled` when the run's cancellation token fires.

use crate::cache::{CacheKey, CacheStore};
use crate::config::{Config, RetryConfig};
use crate::funnel::BackoffPolicy;
use crate::model::{
    FailureReason, FetchTarget, ProductRecord, RawListing, RawPayload, StrategyKind,
    StrategyOutcome,
};
use crate::strategy::{
    build_http_client, DisabledFetcher, HttpPageFetcher, ListingParser, PageArchive,
    PageFetcher, RequestProfile, SiteParser, Strategy,
};
use crate::validate::Validator;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One strategy attempt, as recorded in a funnel run's attempt log
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub strategy: StrategyKind,

    /// 1-based attempt number within the strategy
    pub attempt: u32,

    /// Short description of what happened
    pub outcome: String,
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}: {}", self.strategy, self.attempt, self.outcome)
    }
}

/// Result of running the funnel for one target
#[derive(Debug, Clone)]
pub enum FunnelOutcome {
    /// A strategy produced at least one valid record
    Succeeded {
        strategy: StrategyKind,
        records: Vec<ProductRecord>,
        /// Listings from the accepted payload that failed validation
        rejected: usize,
        attempts: Vec<AttemptRecord>,
    },

    /// Every strategy was tried without an accepted result
    Exhausted {
        tried: Vec<StrategyKind>,
        attempts: Vec<AttemptRecord>,
    },

    /// The run was abandoned; nothing was committed for the interrupted attempt
    Cancelled { attempts: Vec<AttemptRecord> },
}

impl FunnelOutcome {
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// What one strategy's attempts came to
enum StrategyVerdict {
    Accepted {
        records: Vec<ProductRecord>,
        rejected: usize,
    },
    Advance,
    Cancelled,
}

/// How the funnel reads one attempt's outcome
enum Step {
    Accepted {
        records: Vec<ProductRecord>,
        rejected: usize,
    },
    Retry(FailureReason),
    GiveUp(FailureReason),
}

/// The resilience funnel for single fetch targets
///
/// Cheap to share: wrap it in an `Arc` and call `run` from many tasks.
pub struct Funnel {
    strategies: Vec<Strategy>,
    parser: Arc<dyn ListingParser>,
    cache: Arc<dyn CacheStore>,
    validator: Validator,
    max_attempts: [u32; 5],
    backoff: BackoffPolicy,
    challenge_limit: u32,
    ttl: Duration,
    archive: Option<PageArchive>,
}

impl Funnel {
    /// Starts building a funnel around a cache and a parser
    pub fn builder(cache: Arc<dyn CacheStore>, parser: Arc<dyn ListingParser>) -> FunnelBuilder {
        FunnelBuilder::new(cache, parser)
    }

    /// Builds a funnel with the default HTTP, browser and parsing collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - The loaded configuration
    /// * `cache` - The cache store shared by the batch
    ///
    /// # Returns
    ///
    /// * `Ok(Funnel)` - Ready to run
    /// * `Err(FunnelError)` - The HTTP client could not be built
    pub fn from_config(config: &Config, cache: Arc<dyn CacheStore>) -> crate::Result<Self> {
        let client = build_http_client(&config.http)?;
        let http = |profile| -> Arc<dyn PageFetcher> {
            Arc::new(HttpPageFetcher::new(
                client.clone(),
                profile,
                config.endpoints.clone(),
            ))
        };

        let parser = Arc::new(SiteParser::new(config.endpoints.clone()));

        let mut builder = Self::builder(cache, parser);
        if let Some(dir) = &config.debug.save_pages_dir {
            builder = builder.archive(PageArchive::new(dir));
        }

        Ok(builder
            .remote_api(http(RequestProfile::Api))
            .desktop_fetch(http(RequestProfile::Desktop))
            .mobile_fetch(http(RequestProfile::Mobile))
            .stealth_browser(stealth_fetcher(config))
            .retry(&config.retry)
            .challenge_limit(config.funnel.challenge_limit)
            .ttl(config.cache.ttl())
            .build())
    }

    /// The cache store this funnel reads from and writes through to
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn strategies(&self) -> impl Iterator<Item = StrategyKind> + '_ {
        self.strategies.iter().map(Strategy::kind)
    }

    pub fn max_attempts(&self, kind: StrategyKind) -> u32 {
        if kind == StrategyKind::Cached {
            return 1;
        }
        self.max_attempts[kind.index()].max(1)
    }

    /// Runs the funnel for one target
    pub async fn run(&self, target: &FetchTarget) -> FunnelOutcome {
        self.run_until_cancelled(target, &CancellationToken::new())
            .await
    }

    /// Runs the funnel for one target, abandoning it when `cancel` fires
    ///
    /// Strategies are tried strictly in order. A retryable failure is retried
    /// with backoff until the strategy's attempts are used up; a terminal
    /// failure moves on at once. The first payload with at least one valid
    /// listing wins and, unless it came from the cache, is written through
    /// to the cache.
    pub async fn run_until_cancelled(
        &self,
        target: &FetchTarget,
        cancel: &CancellationToken,
    ) -> FunnelOutcome {
        let mut attempts = Vec::new();
        let mut tried = Vec::new();

        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                return FunnelOutcome::Cancelled { attempts };
            }

            let kind = strategy.kind();
            tried.push(kind);
            tracing::debug!("{}: trying {}", target, kind);

            match self
                .run_strategy(strategy, target, cancel, &mut attempts)
                .await
            {
                StrategyVerdict::Accepted { records, rejected } => {
                    tracing::info!(
                        "{}: succeeded via {} ({} records, {} rejected)",
                        target,
                        kind,
                        records.len(),
                        rejected
                    );
                    if kind != StrategyKind::Cached {
                        self.write_through(target, &records);
                    }
                    return FunnelOutcome::Succeeded {
                        strategy: kind,
                        records,
                        rejected,
                        attempts,
                    };
                }
                StrategyVerdict::Advance => {}
                StrategyVerdict::Cancelled => return FunnelOutcome::Cancelled { attempts },
            }
        }

        tracing::warn!(
            "{}: exhausted after {} attempts across {} strategies",
            target,
            attempts.len(),
            tried.len()
        );
        FunnelOutcome::Exhausted { tried, attempts }
    }

    /// Attempts one strategy until it succeeds, gives up, or runs out of attempts
    async fn run_strategy(
        &self,
        strategy: &Strategy,
        target: &FetchTarget,
        cancel: &CancellationToken,
        log: &mut Vec<AttemptRecord>,
    ) -> StrategyVerdict {
        let kind = strategy.kind();
        let max_attempts = self.max_attempts(kind);
        let mut challenges = 0u32;

        for attempt in 1..=max_attempts {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StrategyVerdict::Cancelled,
                outcome = strategy.attempt(
                    target,
                    self.parser.as_ref(),
                    self.archive.as_ref(),
                ) => outcome,
            };

            let step = self.judge(target, outcome, &mut challenges);
            log.push(AttemptRecord {
                strategy: kind,
                attempt,
                outcome: match &step {
                    Step::Accepted { records, rejected } => {
                        format!("accepted {} ({} rejected)", records.len(), rejected)
                    }
                    Step::Retry(reason) => format!("retryable: {}", reason),
                    Step::GiveUp(reason) => format!("terminal: {}", reason),
                },
            });

            match step {
                Step::Accepted { records, rejected } => {
                    return StrategyVerdict::Accepted { records, rejected }
                }
                Step::GiveUp(reason) => {
                    if kind == StrategyKind::Cached {
                        tracing::debug!("{}: {} unusable: {}", target, kind, reason);
                    } else {
                        tracing::warn!("{}: {} gave up: {}", target, kind, reason);
                    }
                    return StrategyVerdict::Advance;
                }
                Step::Retry(reason) if attempt >= max_attempts => {
                    if kind == StrategyKind::Cached {
                        tracing::debug!("{}: {}", target, reason);
                    } else {
                        tracing::warn!(
                            "{}: {} failed {} times, last: {}",
                            target,
                            kind,
                            attempt,
                            reason
                        );
                    }
                    return StrategyVerdict::Advance;
                }
                Step::Retry(reason) => {
                    let delay = self.backoff.delay(attempt - 1);
                    tracing::warn!(
                        "{}: {} attempt {}/{} failed ({}), retrying in {:?}",
                        target,
                        kind,
                        attempt,
                        max_attempts,
                        reason,
                        delay
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return StrategyVerdict::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        StrategyVerdict::Advance
    }

    /// Decides what an attempt's outcome means for the funnel
    ///
    /// Successful payloads pass through the validator; a payload with no valid
    /// listing becomes a retryable rejection. Bot challenges count against the
    /// challenge limit and turn terminal once it is reached.
    fn judge(&self, target: &FetchTarget, outcome: StrategyOutcome, challenges: &mut u32) -> Step {
        match outcome {
            StrategyOutcome::Success(payload) => self.accept(target, payload),
            StrategyOutcome::RetryableFailure(reason) if reason.is_challenge() => {
                *challenges += 1;
                if *challenges >= self.challenge_limit {
                    Step::GiveUp(reason)
                } else {
                    Step::Retry(reason)
                }
            }
            StrategyOutcome::RetryableFailure(reason) => Step::Retry(reason),
            StrategyOutcome::TerminalFailure(reason) => Step::GiveUp(reason),
        }
    }

    fn accept(&self, target: &FetchTarget, payload: RawPayload) -> Step {
        let mut records = Vec::with_capacity(payload.listings.len());
        let mut first_error = None;
        let mut rejected = 0;

        for raw in &payload.listings {
            match self.validator.validate(raw, target.platform, payload.strategy) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::debug!("{}: rejected listing {:?}: {}", target, raw.id, e);
                    rejected += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        if rejected > 0 {
            tracing::warn!(
                "{}: {} of {} listings from {} failed validation",
                target,
                rejected,
                payload.listings.len(),
                payload.strategy
            );
        }

        match first_error {
            Some(e) if records.is_empty() => Step::Retry(FailureReason::Rejected(e)),
            None if records.is_empty() => Step::Retry(FailureReason::NoListings),
            _ => Step::Accepted { records, rejected },
        }
    }

    /// Stores accepted records; failures are logged and otherwise ignored
    fn write_through(&self, target: &FetchTarget, records: &[ProductRecord]) {
        let raw: Vec<RawListing> = records.iter().map(ProductRecord::to_raw).collect();
        let payload = match serde_json::to_string(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("{}: could not serialize records for cache: {}", target, e);
                return;
            }
        };

        if let Err(e) = self
            .cache
            .store(&CacheKey::for_target(target), &payload, self.ttl)
        {
            tracing::warn!("{}: cache write failed: {}", target, e);
        }
    }
}

/// Picks the stealth fetcher for a configuration
#[cfg(feature = "browser")]
fn stealth_fetcher(config: &Config) -> Arc<dyn PageFetcher> {
    if config.browser.enabled {
        Arc::new(crate::strategy::BrowserPageFetcher::new(
            config.browser.clone(),
            config.endpoints.clone(),
        ))
    } else {
        Arc::new(DisabledFetcher::new("browser disabled in configuration"))
    }
}

#[cfg(not(feature = "browser"))]
fn stealth_fetcher(config: &Config) -> Arc<dyn PageFetcher> {
    if config.browser.enabled {
        tracing::debug!("Built without the `browser` feature; stealth strategy unavailable");
    }
    Arc::new(DisabledFetcher::new("built without browser support"))
}

/// Builder for `Funnel`
///
/// Strategies without a fetcher report `Unsupported` when tried.
pub struct FunnelBuilder {
    cache: Arc<dyn CacheStore>,
    parser: Arc<dyn ListingParser>,
    remote_api: Option<Arc<dyn PageFetcher>>,
    desktop_fetch: Option<Arc<dyn PageFetcher>>,
    mobile_fetch: Option<Arc<dyn PageFetcher>>,
    stealth_browser: Option<Arc<dyn PageFetcher>>,
    validator: Validator,
    max_attempts: [u32; 5],
    backoff: BackoffPolicy,
    challenge_limit: u32,
    ttl: Duration,
    archive: Option<PageArchive>,
}

impl FunnelBuilder {
    fn new(cache: Arc<dyn CacheStore>, parser: Arc<dyn ListingParser>) -> Self {
        let retry = RetryConfig::default();
        Self {
            cache,
            parser,
            remote_api: None,
            desktop_fetch: None,
            mobile_fetch: None,
            stealth_browser: None,
            validator: Validator::default(),
            max_attempts: [1; 5],
            backoff: BackoffPolicy::from_config(&retry),
            challenge_limit: 2,
            ttl: crate::config::CacheConfig::default().ttl(),
            archive: None,
        }
        .retry(&retry)
    }

    pub fn remote_api(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.remote_api = Some(fetcher);
        self
    }

    pub fn desktop_fetch(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.desktop_fetch = Some(fetcher);
        self
    }

    pub fn mobile_fetch(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.mobile_fetch = Some(fetcher);
        self
    }

    pub fn stealth_browser(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.stealth_browser = Some(fetcher);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Applies attempt limits and backoff from a retry configuration
    pub fn retry(mut self, retry: &RetryConfig) -> Self {
        for kind in StrategyKind::ALL {
            self.max_attempts[kind.index()] = retry.max_attempts_for(kind);
        }
        self.backoff = BackoffPolicy::from_config(retry);
        self
    }

    /// Overrides the attempt limit of one strategy (the cache is always tried once)
    pub fn max_attempts(mut self, kind: StrategyKind, attempts: u32) -> Self {
        self.max_attempts[kind.index()] = attempts;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn challenge_limit(mut self, limit: u32) -> Self {
        self.challenge_limit = limit.max(1);
        self
    }

    /// How long written-through results stay fresh
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Keeps copies of unusable pages in `archive`
    pub fn archive(mut self, archive: PageArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn build(self) -> Funnel {
        let fetcher = |slot: Option<Arc<dyn PageFetcher>>, kind: StrategyKind| {
            slot.unwrap_or_else(|| {
                Arc::new(DisabledFetcher::new(format!("no {} fetcher configured", kind)))
            })
        };

        let strategies = vec![
            Strategy::Cached {
                cache: Arc::clone(&self.cache),
            },
            Strategy::RemoteApi {
                fetcher: fetcher(self.remote_api, StrategyKind::RemoteApi),
            },
            Strategy::DesktopFetch {
                fetcher: fetcher(self.desktop_fetch, StrategyKind::DesktopFetch),
            },
            Strategy::MobileFetch {
                fetcher: fetcher(self.mobile_fetch, StrategyKind::MobileFetch),
            },
            Strategy::StealthBrowser {
                fetcher: fetcher(self.stealth_browser, StrategyKind::StealthBrowser),
            },
        ];

        Funnel {
            strategies,
            parser: self.parser,
            cache: self.cache,
            validator: self.validator,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            challenge_limit: self.challenge_limit,
            ttl: self.ttl,
            archive: self.archive,
        }
    }
}

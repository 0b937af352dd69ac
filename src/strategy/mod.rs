//! Retrieval strategies
//!
//! This module contains the five ways a page of listings can be obtained,
//! from cheapest to stealthiest:
//! - Cached: a previously accepted result from the cache store
//! - RemoteApi: the platform's structured search API
//! - DesktopFetch / MobileFetch: plain HTTP with a browser-like profile
//! - StealthBrowser: a full headless browser session
//!
//! Each attempt yields a `StrategyOutcome`. The concrete retrieval and
//! parsing mechanics sit behind the `PageFetcher` and `ListingParser`
//! traits so the funnel never depends on them.

mod archive;
mod browser;
mod classify;
mod fetcher;
mod parser;
#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "browser")]
pub use browser::BrowserPageFetcher;
pub use archive::PageArchive;
pub use browser::DisabledFetcher;
pub use classify::{classify_fetch, classify_page, detect_challenge};
pub use fetcher::{build_http_client, listing_url, HttpPageFetcher, RequestProfile};
pub use parser::SiteParser;

use crate::cache::{CacheKey, CacheStore};
use crate::model::{
    FailureReason, FetchTarget, RawListing, RawPayload, StrategyKind, StrategyOutcome,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A page as returned by a fetcher
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// HTTP status code (browsers report 200)
    pub status: u16,

    /// Response body or rendered document
    pub body: String,

    /// URL after redirects
    pub final_url: String,
}

/// Errors a fetcher can report
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("blocked: {0}")]
    Blocked(String),
}

/// Retrieval capability for one strategy
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Retrieves the page for a target
    async fn fetch(&self, target: &FetchTarget) -> Result<FetchedPage, FetchError>;
}

/// Listings extracted from one page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub listings: Vec<RawListing>,

    /// The site said the query has no results at all
    pub no_results: bool,
}

/// Errors a parser can report
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected page structure: {0}")]
    Structure(String),
}

/// Parsing capability shared by all fetch strategies
pub trait ListingParser: Send + Sync {
    /// Extracts raw listings from a fetched page
    ///
    /// # Arguments
    ///
    /// * `target` - The target the page was fetched for
    /// * `kind` - Strategy that fetched it (selects JSON or HTML handling)
    /// * `page` - The fetched page
    fn parse(
        &self,
        target: &FetchTarget,
        kind: StrategyKind,
        page: &FetchedPage,
    ) -> Result<ParsedPage, ParseError>;
}

/// One retrieval strategy, bound to its collaborator
#[derive(Clone)]
pub enum Strategy {
    Cached { cache: Arc<dyn CacheStore> },
    RemoteApi { fetcher: Arc<dyn PageFetcher> },
    DesktopFetch { fetcher: Arc<dyn PageFetcher> },
    MobileFetch { fetcher: Arc<dyn PageFetcher> },
    StealthBrowser { fetcher: Arc<dyn PageFetcher> },
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Strategy({})", self.kind())
    }
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Cached { .. } => StrategyKind::Cached,
            Strategy::RemoteApi { .. } => StrategyKind::RemoteApi,
            Strategy::DesktopFetch { .. } => StrategyKind::DesktopFetch,
            Strategy::MobileFetch { .. } => StrategyKind::MobileFetch,
            Strategy::StealthBrowser { .. } => StrategyKind::StealthBrowser,
        }
    }

    /// Makes one attempt at a target
    ///
    /// `Success` is only returned for listings obtained during this attempt.
    /// Unusable pages are copied into `archive` when one is given.
    pub async fn attempt(
        &self,
        target: &FetchTarget,
        parser: &dyn ListingParser,
        archive: Option<&PageArchive>,
    ) -> StrategyOutcome {
        let kind = self.kind();
        let fetcher = match self {
            Strategy::Cached { cache } => return attempt_cached(cache.as_ref(), target),
            Strategy::RemoteApi { fetcher }
            | Strategy::DesktopFetch { fetcher }
            | Strategy::MobileFetch { fetcher }
            | Strategy::StealthBrowser { fetcher } => fetcher,
        };

        let page = match fetcher.fetch(target).await {
            Ok(page) => page,
            Err(e) => return classify_fetch(kind, target, Err(e), parser),
        };

        let outcome = classify_page(kind, target, &page, parser);
        if let Some(archive) = archive {
            archive.keep_if_unusable(target, kind, &page, &outcome);
        }
        outcome
    }
}

/// Reads a target's entry from the cache
fn attempt_cached(cache: &dyn CacheStore, target: &FetchTarget) -> StrategyOutcome {
    let key = CacheKey::for_target(target);
    let Some(entry) = cache.lookup(&key) else {
        return StrategyOutcome::RetryableFailure(FailureReason::CacheMiss);
    };

    match serde_json::from_str::<Vec<RawListing>>(&entry.payload) {
        Ok(listings) if listings.is_empty() => {
            StrategyOutcome::RetryableFailure(FailureReason::NoListings)
        }
        Ok(listings) => {
            StrategyOutcome::Success(RawPayload::new(StrategyKind::Cached, listings))
        }
        Err(e) => {
            tracing::warn!("Corrupt cache entry for {}: {}", target, e);
            StrategyOutcome::RetryableFailure(FailureReason::CorruptCacheEntry)
        }
    }
}

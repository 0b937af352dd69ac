//! Scripted collaborators for funnel and batch tests

use crate::model::{FetchTarget, RawListing, StrategyKind};
use crate::strategy::{FetchError, FetchedPage, ListingParser, PageFetcher, ParseError, ParsedPage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fetcher that replays a script, repeating the last step once exhausted
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<FetchedPage, FetchError>>>,
    last: Mutex<Option<Result<FetchedPage, FetchError>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<FetchedPage, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers with `listings` as a JSON body
    pub fn listings(listings: &[RawListing]) -> Self {
        Self::new(vec![Ok(json_page(listings))])
    }

    /// Always fails with `error`
    pub fn failing(error: FetchError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Always answers with `status`
    pub fn status(status: u16) -> Self {
        Self::new(vec![Ok(FetchedPage {
            status,
            body: "[]".to_string(),
            final_url: "https://shop.test/s".to_string(),
        })])
    }

    /// Waits before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, _target: &FetchTarget) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(FetchError::Unsupported("empty script".to_string()))),
        }
    }
}

/// Page whose body is a JSON array of listings
pub fn json_page(listings: &[RawListing]) -> FetchedPage {
    FetchedPage {
        status: 200,
        body: serde_json::to_string(listings).unwrap(),
        final_url: "https://shop.test/s".to_string(),
    }
}

/// Parser reading a JSON array of `RawListing`
pub struct JsonParser;

impl ListingParser for JsonParser {
    fn parse(
        &self,
        _target: &FetchTarget,
        _kind: StrategyKind,
        page: &FetchedPage,
    ) -> Result<ParsedPage, ParseError> {
        let listings: Vec<RawListing> = serde_json::from_str(&page.body)?;
        Ok(ParsedPage {
            listings,
            no_results: false,
        })
    }
}

/// Listing with the three required fields
pub fn listing(id: &str, title: &str, price: &str) -> RawListing {
    RawListing {
        id: Some(id.to_string()),
        title: Some(title.to_string()),
        price: Some(price.into()),
        ..Default::default()
    }
}

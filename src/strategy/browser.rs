//! Headless browser fetcher for the stealth strategy
//!
//! The real implementation drives Chromium through `chromiumoxide` and is
//! only compiled with the `browser` feature. Without it (or with
//! `[browser] enabled = false`) the stealth slot is filled by
//! `DisabledFetcher`, which the funnel classifies as a terminal
//! `Unsupported` failure.

use crate::model::FetchTarget;
use crate::strategy::{FetchError, FetchedPage, PageFetcher};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

type Release<T> = fn(T) -> Pin<Box<dyn Future<Output = ()> + Send>>;

/// Holds a resource that has to be released asynchronously
///
/// `finish` awaits the release. If the holder is dropped first, because the
/// attempt timed out or the funnel abandoned it, the release is spawned onto
/// the current runtime instead. Either way it runs once.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
struct ReleaseOnDrop<T: Send + 'static> {
    value: Option<T>,
    release: Release<T>,
}

#[cfg_attr(not(feature = "browser"), allow(dead_code))]
impl<T: Send + 'static> ReleaseOnDrop<T> {
    fn new(value: T, release: Release<T>) -> Self {
        Self {
            value: Some(value),
            release,
        }
    }

    async fn finish(mut self) {
        if let Some(value) = self.value.take() {
            (self.release)(value).await;
        }
    }
}

impl<T: Send + 'static> Drop for ReleaseOnDrop<T> {
    fn drop(&mut self) {
        let Some(value) = self.value.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn((self.release)(value));
            }
            Err(_) => tracing::debug!("No runtime left to release an abandoned resource"),
        }
    }
}

/// Stand-in fetcher for a strategy with no backend
#[derive(Debug, Clone)]
pub struct DisabledFetcher {
    reason: String,
}

impl DisabledFetcher {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PageFetcher for DisabledFetcher {
    async fn fetch(&self, _target: &FetchTarget) -> Result<FetchedPage, FetchError> {
        Err(FetchError::Unsupported(self.reason.clone()))
    }
}

#[cfg(feature = "browser")]
pub use chromium::BrowserPageFetcher;

#[cfg(feature = "browser")]
mod chromium {
    use crate::config::{BrowserConfig, EndpointsConfig};
    use crate::model::FetchTarget;
    use crate::strategy::fetcher::{listing_url, RequestProfile};
    use super::ReleaseOnDrop;
    use crate::strategy::{FetchError, FetchedPage, PageFetcher};
    use async_trait::async_trait;
    use chromiumoxide::{Browser, BrowserConfig as ChromeConfig, Page};
    use futures::StreamExt;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;
    use tokio::sync::OnceCell;

    /// Error fragments Chromium reports when a request is refused outright
    const BLOCKED_MARKERS: &[&str] = &["ERR_BLOCKED", "ERR_ACCESS_DENIED"];

    fn close_tab(page: Page) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            if let Err(e) = page.close().await {
                tracing::debug!("Failed to close browser tab: {}", e);
            }
        })
    }

    /// Fetcher that renders pages in headless Chromium
    ///
    /// The browser is launched on first use and shared by every fetch made
    /// through this instance; each fetch gets its own tab.
    pub struct BrowserPageFetcher {
        browser: OnceCell<Browser>,
        config: BrowserConfig,
        endpoints: EndpointsConfig,
    }

    impl BrowserPageFetcher {
        pub fn new(config: BrowserConfig, endpoints: EndpointsConfig) -> Self {
            Self {
                browser: OnceCell::new(),
                config,
                endpoints,
            }
        }

        async fn browser(&self) -> Result<&Browser, FetchError> {
            self.browser
                .get_or_try_init(|| async {
                    let config = ChromeConfig::builder()
                        .no_sandbox()
                        .request_timeout(Duration::from_secs(self.config.navigation_timeout_secs))
                        .arg("--disable-gpu")
                        .arg("--disable-dev-shm-usage")
                        .arg("--disable-blink-features=AutomationControlled")
                        .build()
                        .map_err(FetchError::Unsupported)?;

                    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
                        FetchError::Unsupported(format!("failed to launch browser: {}", e))
                    })?;

                    tokio::spawn(async move {
                        while let Some(event) = handler.next().await {
                            if event.is_err() {
                                break;
                            }
                        }
                    });

                    tracing::info!("Headless browser launched");
                    Ok(browser)
                })
                .await
        }

        async fn render(&self, url: &str) -> Result<FetchedPage, FetchError> {
            let browser = self.browser().await?;

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| FetchError::Navigation(e.to_string()))?;
            // Closes the tab even if this future is dropped mid-navigation
            let tab = ReleaseOnDrop::new(page.clone(), close_tab);

            let timeout = Duration::from_secs(self.config.navigation_timeout_secs);
            let rendered = tokio::time::timeout(timeout, async {
                page.set_user_agent(RequestProfile::Desktop.user_agent())
                    .await
                    .map_err(|e| FetchError::Navigation(e.to_string()))?;

                page.goto(url).await.map_err(|e| {
                    let message = e.to_string();
                    if BLOCKED_MARKERS.iter().any(|m| message.contains(m)) {
                        FetchError::Blocked(message)
                    } else {
                        FetchError::Navigation(message)
                    }
                })?;

                tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;

                let body = page
                    .content()
                    .await
                    .map_err(|e| FetchError::Navigation(e.to_string()))?;
                let final_url = page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| url.to_string());

                Ok::<_, FetchError>(FetchedPage {
                    status: 200,
                    body,
                    final_url,
                })
            })
            .await
            .unwrap_or(Err(FetchError::Timeout));

            tab.finish().await;
            rendered
        }
    }

    #[async_trait]
    impl PageFetcher for BrowserPageFetcher {
        async fn fetch(&self, target: &FetchTarget) -> Result<FetchedPage, FetchError> {
            let url = listing_url(&self.endpoints, target, RequestProfile::Desktop)?;
            tracing::debug!("Browser navigating to {}", url);
            self.render(url.as_str()).await
        }
    }
}

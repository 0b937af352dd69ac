//! HTTP fetcher implementation
//!
//! This module handles the plain-HTTP strategies (RemoteApi, DesktopFetch,
//! MobileFetch), including:
//! - Building the shared HTTP client
//! - Building search URLs per platform and request profile
//! - Rotating user agents per request
//! - Mapping transport failures onto `FetchError`

use crate::config::{EndpointsConfig, HttpConfig};
use crate::model::{FetchTarget, Platform};
use crate::strategy::{FetchError, FetchedPage, PageFetcher};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Listings per MercadoLibre results page
pub const RESULTS_PER_PAGE: u32 = 50;

const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:131.0) Gecko/20100101 Firefox/131.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.0 Safari/605.1.15",
];

const MOBILE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 18_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Mobile Safari/537.36",
];

const API_USER_AGENT: &str = concat!("listing-funnel/", env!("CARGO_PKG_VERSION"));

const HTML_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// How a request presents itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestProfile {
    /// JSON request against a structured endpoint
    Api,

    /// Desktop browser
    Desktop,

    /// Mobile browser, using the platform's mobile pages where they exist
    Mobile,
}

impl RequestProfile {
    /// Picks a user agent for one request
    pub fn user_agent(&self) -> &'static str {
        let pool = match self {
            Self::Api => return API_USER_AGENT,
            Self::Desktop => DESKTOP_USER_AGENTS,
            Self::Mobile => MOBILE_USER_AGENTS,
        };
        pool.choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(pool[0])
    }

    pub fn accept(&self) -> &'static str {
        match self {
            Self::Api => "application/json",
            Self::Desktop | Self::Mobile => HTML_ACCEPT,
        }
    }
}

/// Builds the HTTP client shared by the plain-HTTP strategies
///
/// User agents are set per request, so the client carries none.
///
/// # Arguments
///
/// * `config` - The HTTP configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds the URL of a target's results page for a request profile
///
/// # URL shapes
///
/// | Platform | Profile | URL |
/// |----------|---------|-----|
/// | Amazon | Api | unsupported |
/// | Amazon | Desktop | `{amazon}/s?k=query&page=N` |
/// | Amazon | Mobile | `{amazon}/gp/aw/s?k=query&page=N` |
/// | MercadoLibre | Api | `{api}/sites/{SITE}/search?q=query&offset=..&limit=50` |
/// | MercadoLibre | Desktop, Mobile | `{listings}/query-words[_Desde_K]` |
///
/// # Returns
///
/// * `Ok(Url)` - The URL to request
/// * `Err(FetchError::Unsupported)` - No such page exists, or the endpoint is unusable
pub fn listing_url(
    endpoints: &EndpointsConfig,
    target: &FetchTarget,
    profile: RequestProfile,
) -> Result<Url, FetchError> {
    let query = target.normalized_query();
    let page = target.page.max(1);

    match (target.platform, profile) {
        (Platform::Amazon, RequestProfile::Api) => Err(FetchError::Unsupported(
            "Amazon has no structured search API".to_string(),
        )),
        (Platform::Amazon, RequestProfile::Desktop | RequestProfile::Mobile) => {
            let path = if profile == RequestProfile::Mobile {
                "gp/aw/s"
            } else {
                "s"
            };
            let mut url = endpoint(&endpoints.amazon, path)?;
            url.query_pairs_mut()
                .append_pair("k", &query)
                .append_pair("page", &page.to_string());
            Ok(url)
        }
        (Platform::MercadoLibre, RequestProfile::Api) => {
            let site = mercadolibre_site(target.region.as_deref());
            let mut url = endpoint(
                &endpoints.mercadolibre_api,
                &format!("sites/{}/search", site),
            )?;
            url.query_pairs_mut()
                .append_pair("q", &query)
                .append_pair("offset", &((page - 1) * RESULTS_PER_PAGE).to_string())
                .append_pair("limit", &RESULTS_PER_PAGE.to_string());
            Ok(url)
        }
        (Platform::MercadoLibre, RequestProfile::Desktop | RequestProfile::Mobile) => {
            let mut slug = query.replace(' ', "-");
            if page > 1 {
                slug.push_str(&format!("_Desde_{}", (page - 1) * RESULTS_PER_PAGE + 1));
            }
            endpoint(&endpoints.mercadolibre_listings, &slug)
        }
    }
}

/// Joins a configured base URL and a path
fn endpoint(base: &str, path: &str) -> Result<Url, FetchError> {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path);
    Url::parse(&joined)
        .map_err(|e| FetchError::Unsupported(format!("invalid endpoint '{}': {}", joined, e)))
}

/// MercadoLibre site ID for a country code (Colombia when unset)
fn mercadolibre_site(region: Option<&str>) -> &'static str {
    match region.map(|r| r.to_ascii_lowercase()).as_deref() {
        Some("ar") => "MLA",
        Some("br") => "MLB",
        Some("cl") => "MLC",
        Some("mx") => "MLM",
        Some("pe") => "MPE",
        Some("uy") => "MLU",
        _ => "MCO",
    }
}

fn accept_language(platform: Platform) -> &'static str {
    match platform {
        Platform::Amazon => "en-US,en;q=0.9",
        Platform::MercadoLibre => "es-CO,es;q=0.9,en;q=0.5",
    }
}

fn map_reqwest_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_redirect() {
        FetchError::Navigation(error.to_string())
    } else {
        FetchError::Network(error.to_string())
    }
}

/// Plain-HTTP fetcher bound to one request profile
pub struct HttpPageFetcher {
    client: Client,
    profile: RequestProfile,
    endpoints: EndpointsConfig,
}

impl HttpPageFetcher {
    /// Creates a fetcher
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client (see `build_http_client`)
    /// * `profile` - How requests present themselves
    /// * `endpoints` - Base URLs to build request URLs from
    pub fn new(client: Client, profile: RequestProfile, endpoints: EndpointsConfig) -> Self {
        Self {
            client,
            profile,
            endpoints,
        }
    }

    pub fn profile(&self) -> RequestProfile {
        self.profile
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, target: &FetchTarget) -> Result<FetchedPage, FetchError> {
        let url = listing_url(&self.endpoints, target, self.profile)?;
        tracing::debug!("{:?} GET {}", self.profile, url);

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.profile.user_agent())
            .header(ACCEPT, self.profile.accept())
            .header(ACCEPT_LANGUAGE, accept_language(target.platform))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(map_reqwest_error)?;

        tracing::trace!("{} -> {} ({} bytes)", final_url, status, body.len());

        Ok(FetchedPage {
            status,
            body,
            final_url,
        })
    }
}

//! Listing extraction for search result pages
//!
//! This module turns fetched pages into raw listings:
//! - Amazon result HTML (desktop, mobile and browser-rendered)
//! - MercadoLibre result HTML (classic and "poly card" layouts)
//! - MercadoLibre search API JSON
//!
//! Extraction is deliberately lenient: a listing with a missing field is
//! still returned, and the validator decides whether it is usable.

use crate::config::EndpointsConfig;
use crate::model::{FetchTarget, Platform, RawListing, RawPrice, StrategyKind};
use crate::strategy::{FetchedPage, ListingParser, ParseError, ParsedPage};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::sync::OnceLock;
use url::Url;

const AMAZON_CONTAINERS: &[&str] = &[
    r#"div[data-component-type="s-search-result"]"#,
    "div.s-result-item[data-asin]",
];

const MERCADOLIBRE_CONTAINERS: &[&str] = &[
    "li.ui-search-layout__item",
    "div.ui-search-result__wrapper",
    "div.poly-card",
];

/// Characters of markup quoted when a listing field cannot be extracted
const SNIPPET_CHARS: usize = 500;

const AMAZON_NO_RESULTS: &str = "No results for";
const MERCADOLIBRE_NO_RESULTS: &str = "No hay publicaciones que coincidan";

/// Default `ListingParser` for the supported platforms
#[derive(Debug, Clone)]
pub struct SiteParser {
    endpoints: EndpointsConfig,
}

impl SiteParser {
    pub fn new(endpoints: EndpointsConfig) -> Self {
        Self { endpoints }
    }

    /// Base for resolving relative links: the page's own URL, else the platform's endpoint
    fn base_url(&self, platform: Platform, page: &FetchedPage) -> Option<Url> {
        Url::parse(&page.final_url).ok().or_else(|| {
            let base = match platform {
                Platform::Amazon => &self.endpoints.amazon,
                Platform::MercadoLibre => &self.endpoints.mercadolibre_listings,
            };
            Url::parse(base).ok()
        })
    }
}

impl Default for SiteParser {
    fn default() -> Self {
        Self::new(EndpointsConfig::default())
    }
}

impl ListingParser for SiteParser {
    fn parse(
        &self,
        target: &FetchTarget,
        kind: StrategyKind,
        page: &FetchedPage,
    ) -> Result<ParsedPage, ParseError> {
        let base = self.base_url(target.platform, page);

        match (target.platform, kind) {
            (_, StrategyKind::Cached) => Err(ParseError::Structure(
                "cached payloads are decoded, not parsed".to_string(),
            )),
            (Platform::Amazon, StrategyKind::RemoteApi) => Err(ParseError::Structure(
                "Amazon has no API response format".to_string(),
            )),
            (Platform::MercadoLibre, StrategyKind::RemoteApi) => {
                parse_mercadolibre_api(&page.body)
            }
            (Platform::Amazon, _) => Ok(parse_amazon_html(&page.body, base.as_ref())),
            (Platform::MercadoLibre, _) => Ok(parse_mercadolibre_html(&page.body, base.as_ref())),
        }
    }
}

// ===== Amazon =====

fn parse_amazon_html(body: &str, base: Option<&Url>) -> ParsedPage {
    let document = Html::parse_document(body);

    let no_results = select_all(&document, "h1, .a-row")
        .iter()
        .any(|e| element_text(*e).contains(AMAZON_NO_RESULTS));
    if no_results {
        tracing::debug!("Amazon 'no results' page");
        return ParsedPage {
            listings: Vec::new(),
            no_results: true,
        };
    }

    let listings = first_containers(&document, AMAZON_CONTAINERS)
        .into_iter()
        .filter_map(|item| {
            let listing = amazon_listing(item, base)?;
            report_missing_fields(Platform::Amazon, item, &listing);
            Some(listing)
        })
        .collect();

    ParsedPage {
        listings,
        no_results: false,
    }
}

fn amazon_listing(item: ElementRef<'_>, base: Option<&Url>) -> Option<RawListing> {
    // Layout placeholders carry an empty data-asin
    let asin = item
        .value()
        .attr("data-asin")
        .map(str::trim)
        .filter(|a| !a.is_empty())?;

    let title = first_text(item, &["h2 a span", "h2 span", "h2 a", "h2"]);

    let price = first_text(
        item,
        &["span.a-price .a-offscreen", ".a-price-range .a-offscreen"],
    )
    .or_else(|| {
        let whole = first_text(item, &["span.a-price-whole"])?;
        let whole: String = whole
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == ',')
            .collect();
        let fraction = first_text(item, &["span.a-price-fraction"]).unwrap_or_default();
        Some(if fraction.is_empty() {
            whole
        } else {
            format!("{}.{}", whole, fraction)
        })
    })
    .map(RawPrice::Text);

    let rating = first_text(item, &["span.a-icon-alt", "[aria-label*='out of']"])
        .and_then(|text| leading_number(&text));

    let review_count = first_text(
        item,
        &[
            "span.a-size-base.s-underline-text",
            "a[href*='#customerReviews'] span",
            "a[href*='#reviews'] span",
        ],
    )
    .and_then(|text| digits(&text).parse::<i64>().ok());

    let url = first_href(
        item,
        &[
            "a.a-link-normal.s-no-outline",
            "h2 a",
            "a.a-link-normal",
            "a[href*='/dp/']",
        ],
        base,
    )
    .or_else(|| base.and_then(|b| b.join(&format!("/dp/{}", asin)).ok()).map(String::from));

    Some(RawListing {
        id: Some(asin.to_string()),
        title,
        price,
        url,
        currency: first_text(item, &["span.a-price-symbol"]),
        rating,
        review_count,
    })
}

// ===== MercadoLibre =====

fn parse_mercadolibre_html(body: &str, base: Option<&Url>) -> ParsedPage {
    let document = Html::parse_document(body);

    if element_text(document.root_element()).contains(MERCADOLIBRE_NO_RESULTS) {
        tracing::debug!("MercadoLibre 'no results' page");
        return ParsedPage {
            listings: Vec::new(),
            no_results: true,
        };
    }

    let listings = first_containers(&document, MERCADOLIBRE_CONTAINERS)
        .into_iter()
        .map(|item| {
            let listing = mercadolibre_listing(item, base);
            report_missing_fields(Platform::MercadoLibre, item, &listing);
            listing
        })
        .collect();

    ParsedPage {
        listings,
        no_results: false,
    }
}

fn mercadolibre_listing(item: ElementRef<'_>, base: Option<&Url>) -> RawListing {
    let title = first_attr(item, "img[title]", "title").or_else(|| {
        first_text(
            item,
            &[
                "h2.ui-search-item__title",
                ".ui-search-item__title",
                "a.poly-component__title",
                "h2 a",
                "h3 a",
            ],
        )
    });

    let url = first_href(
        item,
        &[
            "a.ui-search-link",
            "a.poly-component__title",
            "h2 a",
            "h3 a",
            "a[href]",
        ],
        base,
    );

    let id = url.as_deref().and_then(mercadolibre_item_id);

    // The current price comes after any struck-through previous price
    let price = first_text(
        item,
        &[
            ".poly-price__current .andes-money-amount__fraction",
            ".ui-search-price__second-line .andes-money-amount__fraction",
            "span.andes-money-amount__fraction",
            ".price-tag-fraction",
        ],
    )
    .map(|fraction| {
        match first_text(item, &[".poly-price__current .andes-money-amount__cents"]) {
            Some(cents) => format!("{},{}", fraction, cents),
            None => fraction,
        }
    })
    .map(RawPrice::Text);

    let currency = first_text(
        item,
        &[".andes-money-amount__currency-symbol", ".price-tag-symbol"],
    );

    let rating = first_text(
        item,
        &[".poly-reviews__rating", ".ui-search-reviews__rating-number"],
    )
    .and_then(|text| leading_number(&text.replace(',', ".")));

    let review_count = first_text(
        item,
        &[".poly-reviews__total", ".ui-search-reviews__amount"],
    )
    .and_then(|text| digits(&text).parse::<i64>().ok());

    RawListing {
        id,
        title,
        price,
        url,
        currency,
        rating,
        review_count,
    }
}

/// Extracts an item ID such as `MCO123456` from a listing URL
fn mercadolibre_item_id(url: &str) -> Option<String> {
    static ITEM_ID: OnceLock<Regex> = OnceLock::new();
    let re = ITEM_ID.get_or_init(|| Regex::new(r"(M[A-Z]{2})-?(\d{4,})").expect("valid regex"));
    re.captures(url).map(|c| format!("{}{}", &c[1], &c[2]))
}

#[derive(Debug, Deserialize)]
struct ApiSearch {
    results: Vec<ApiItem>,
    #[serde(default)]
    paging: Option<ApiPaging>,
}

#[derive(Debug, Deserialize)]
struct ApiPaging {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    id: Option<String>,
    title: Option<String>,
    permalink: Option<String>,
    price: Option<f64>,
    currency_id: Option<String>,
}

fn parse_mercadolibre_api(body: &str) -> Result<ParsedPage, ParseError> {
    let search: ApiSearch = serde_json::from_str(body)?;

    let no_results = search.results.is_empty() && search.paging.is_some_and(|p| p.total == 0);

    let listings = search
        .results
        .into_iter()
        .map(|item| RawListing {
            id: item.id,
            title: item.title,
            price: item.price.map(RawPrice::Number),
            url: item.permalink,
            currency: item.currency_id,
            rating: None,
            review_count: None,
        })
        .collect();

    Ok(ParsedPage {
        listings,
        no_results,
    })
}

// ===== Shared helpers =====

/// Required fields a listing came out of extraction without
fn missing_fields(listing: &RawListing) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if listing.id.is_none() {
        missing.push("id");
    }
    if listing.title.is_none() {
        missing.push("title");
    }
    if listing.price.is_none() {
        missing.push("price");
    }
    missing
}

/// Logs the markup of a listing whose required fields could not all be found
///
/// Such listings are later rejected by the validator; the snippet shows which
/// selector stopped matching.
fn report_missing_fields(platform: Platform, item: ElementRef<'_>, listing: &RawListing) {
    let missing = missing_fields(listing);
    if missing.is_empty() {
        return;
    }
    tracing::warn!(
        "[{}] could not extract {}; snippet: {}",
        platform,
        missing.join(", "),
        html_snippet(&item.html())
    );
}

/// Markup on one line, cut to `SNIPPET_CHARS` characters
fn html_snippet(html: &str) -> String {
    html.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SNIPPET_CHARS)
        .collect()
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Result containers from the first selector that matches anything
fn first_containers<'a>(document: &'a Html, selectors: &[&str]) -> Vec<ElementRef<'a>> {
    selectors
        .iter()
        .map(|css| select_all(document, css))
        .find(|items| !items.is_empty())
        .unwrap_or_default()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first non-empty match among `selectors`
fn first_text(item: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        item.select(&selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

fn first_attr(item: ElementRef<'_>, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    item.select(&selector)
        .filter_map(|e| e.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// First link among `selectors`, resolved against `base`
fn first_href(item: ElementRef<'_>, selectors: &[&str], base: Option<&Url>) -> Option<String> {
    selectors.iter().find_map(|css| {
        let href = first_attr(item, css, "href")?;
        match base {
            Some(base) => base.join(&href).ok().map(String::from),
            None => Url::parse(&href).ok().map(String::from),
        }
    })
}

fn digits(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// First decimal number in `text` ("4.5 out of 5 stars" -> 4.5)
fn leading_number(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = NUMBER.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));
    re.find(text)?.as_str().parse().ok()
}

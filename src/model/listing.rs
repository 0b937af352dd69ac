//! Listing payloads and validated product records

use crate::model::StrategyKind;
use serde::{Deserialize, Serialize};

/// A price as found on a page or in an API response
///
/// APIs hand back numbers, HTML pages hand back text such as `"$1,299.00"`
/// or `"1.299.900"`; normalization happens in the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Number(f64),
    Text(String),
}

impl From<f64> for RawPrice {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RawPrice {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One listing as extracted by a parser, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<RawPrice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<i64>,
}

/// The success payload of one strategy attempt for one page
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    /// Strategy that obtained the payload
    pub strategy: StrategyKind,

    /// Listings in page order
    pub listings: Vec<RawListing>,
}

impl RawPayload {
    pub fn new(strategy: StrategyKind, listings: Vec<RawListing>) -> Self {
        Self { strategy, listings }
    }
}

/// A listing that passed validation
///
/// Records are never mutated after construction; the result set only appends
/// or discards them.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    /// Stable platform listing ID (ASIN, MLA/MCO item ID, ...)
    pub identity: String,

    pub title: String,

    /// Normalized, non-negative price
    pub price: f64,

    /// Absolute http(s) URL, if the listing had one
    pub url: Option<String>,

    pub currency: String,

    /// 0..=5 star rating, if known
    pub rating: Option<f64>,

    pub review_count: Option<u64>,

    /// Strategy whose payload produced this record
    pub raw_source_strategy: StrategyKind,
}

impl ProductRecord {
    /// Converts the record back to its serialized listing form
    ///
    /// This is what gets written to the cache; validating it again yields the
    /// same record.
    pub fn to_raw(&self) -> RawListing {
        RawListing {
            id: Some(self.identity.clone()),
            title: Some(self.title.clone()),
            price: Some(RawPrice::Number(self.price)),
            url: self.url.clone(),
            currency: Some(self.currency.clone()),
            rating: self.rating,
            review_count: self.review_count.map(|c| c as i64),
        }
    }
}

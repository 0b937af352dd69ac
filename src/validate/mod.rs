//! Listing validation
//!
//! The validator is the gate between a strategy's raw output and everything
//! downstream: only records that pass here are deduplicated, reported, or
//! written to the cache.

mod price;
mod rules;

pub use price::{normalize_price, PriceLocale};
pub use rules::ValidationRules;

use crate::model::{Platform, ProductRecord, RawListing, RawPrice, StrategyKind};
use std::collections::HashMap;
use thiserror::Error;

/// Longest title kept on a record, in characters
pub const MAX_TITLE_CHARS: usize = 200;

/// Why a listing was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("bad price: {0}")]
    BadPrice(String),

    #[error("bad identity: {0}")]
    BadIdentity(String),

    #[error("empty title")]
    EmptyTitle,
}

/// Checks raw listings against per-platform rules
#[derive(Debug, Clone)]
pub struct Validator {
    rules: HashMap<Platform, ValidationRules>,
}

impl Default for Validator {
    fn default() -> Self {
        let rules = [Platform::Amazon, Platform::MercadoLibre]
            .into_iter()
            .map(|p| (p, ValidationRules::for_platform(p)))
            .collect();
        Self { rules }
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the rules used for one platform
    pub fn with_rules(mut self, platform: Platform, rules: ValidationRules) -> Self {
        self.rules.insert(platform, rules);
        self
    }

    fn rules(&self, platform: Platform) -> ValidationRules {
        self.rules
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| ValidationRules::for_platform(platform))
    }

    /// Validates one listing
    ///
    /// Checks run in this order and the first failure is returned:
    ///
    /// 1. `id`, `title` and `price` are present
    /// 2. price normalizes to a finite, non-negative number
    /// 3. identity matches the platform's identifier pattern
    /// 4. title is non-empty after trimming
    ///
    /// Optional fields are cleaned rather than rejected: non-http URLs,
    /// ratings outside 0..=5 and negative review counts are dropped.
    ///
    /// # Arguments
    ///
    /// * `raw` - The listing as parsed
    /// * `platform` - Platform whose rules apply
    /// * `source` - Strategy that produced the listing
    pub fn validate(
        &self,
        raw: &RawListing,
        platform: Platform,
        source: StrategyKind,
    ) -> Result<ProductRecord, ValidationError> {
        let rules = self.rules(platform);

        let id = raw.id.as_deref().ok_or(ValidationError::MissingField("id"))?;
        let title = raw
            .title
            .as_deref()
            .ok_or(ValidationError::MissingField("title"))?;
        let price = raw
            .price
            .as_ref()
            .ok_or(ValidationError::MissingField("price"))?;

        let price = match price {
            RawPrice::Number(n) => *n,
            RawPrice::Text(text) => normalize_price(text, rules.locale)
                .ok_or_else(|| ValidationError::BadPrice(format!("unparseable '{}'", text)))?,
        };
        if !price.is_finite() || price < 0.0 {
            return Err(ValidationError::BadPrice(format!("{} is not a valid price", price)));
        }

        let identity = id.trim();
        if !rules.identity_pattern.is_match(identity) {
            return Err(ValidationError::BadIdentity(format!(
                "'{}' does not match {}",
                identity,
                rules.identity_pattern.as_str()
            )));
        }

        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let title: String = title.chars().take(MAX_TITLE_CHARS).collect();

        let url = raw
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .map(str::to_string);

        let currency = raw
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(rules.default_currency.as_str())
            .to_string();

        let rating = raw.rating.filter(|r| r.is_finite() && (0.0..=5.0).contains(r));
        let review_count = raw
            .review_count
            .and_then(|c| u64::try_from(c).ok());

        Ok(ProductRecord {
            identity: identity.to_string(),
            title,
            price,
            url,
            currency,
            rating,
            review_count,
            raw_source_strategy: source,
        })
    }
}

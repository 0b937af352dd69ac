//! Fetch target definitions
//!
//! A fetch target identifies one search result page on one platform.

use serde::{Deserialize, Serialize};
use std::fmt;

/// E-commerce platforms the funnel knows how to address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    MercadoLibre,
}

impl Platform {
    /// Returns the stable lowercase name used in config files and cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amazon => "amazon",
            Self::MercadoLibre => "mercadolibre",
        }
    }

    /// Parses a platform from its config name
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Some(Self::Amazon),
            "mercadolibre" => Some(Self::MercadoLibre),
            _ => None,
        }
    }

    /// Whether the platform exposes a structured search endpoint
    ///
    /// Only these platforms can be served by the RemoteAPI strategy.
    pub fn has_structured_api(&self) -> bool {
        matches!(self, Self::MercadoLibre)
    }

    /// Human-readable label used in logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Amazon => "Amazon",
            Self::MercadoLibre => "MercadoLibre",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One unit of scheduling: a single results page for a query on a platform
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTarget {
    /// Platform to query
    pub platform: Platform,

    /// Search terms as entered by the user
    pub query: String,

    /// 1-based results page
    pub page: u32,

    /// Platform-specific site disambiguator (e.g. MercadoLibre country code)
    pub region: Option<String>,
}

impl FetchTarget {
    /// Creates a target without a region
    pub fn new(platform: Platform, query: impl Into<String>, page: u32) -> Self {
        Self {
            platform,
            query: query.into(),
            page,
            region: None,
        }
    }

    /// Sets the region disambiguator
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Returns the query trimmed, lower-cased, with whitespace collapsed
    pub fn normalized_query(&self) -> String {
        self.query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Identifies the search this page belongs to, ignoring the page index
    pub fn search_key(&self) -> (Platform, String, Option<String>) {
        (self.platform, self.normalized_query(), self.region.clone())
    }
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] '{}' page {}", self.platform, self.query, self.page)?;
        if let Some(region) = &self.region {
            write!(f, " ({})", region)?;
        }
        Ok(())
    }
}

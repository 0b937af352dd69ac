use crate::model::Platform;
use crate::validate::price::PriceLocale;
use regex::Regex;

/// Per-platform validation rules
#[derive(Debug, Clone)]
pub struct ValidationRules {
    /// Pattern a listing ID must match in full
    pub identity_pattern: Regex,

    /// Separator conventions for price text
    pub locale: PriceLocale,

    /// Currency used when the listing does not state one
    pub default_currency: String,
}

impl ValidationRules {
    /// Builds rules from an identity pattern
    pub fn new(
        identity_pattern: &str,
        locale: PriceLocale,
        default_currency: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            identity_pattern: Regex::new(identity_pattern)?,
            locale,
            default_currency: default_currency.to_string(),
        })
    }

    /// Default rules for a platform
    pub fn for_platform(platform: Platform) -> Self {
        let (pattern, locale) = match platform {
            // ASINs: ten upper-case alphanumerics
            Platform::Amazon => (r"^[A-Z0-9]{10}$", PriceLocale::EN_US),
            // Site prefix (MLA, MCO, MLB, ...) followed by the item number
            Platform::MercadoLibre => (r"^M[A-Z]{2}-?\d+$", PriceLocale::ES_CO),
        };
        Self::new(pattern, locale, "$").expect("built-in identity patterns compile")
    }
}

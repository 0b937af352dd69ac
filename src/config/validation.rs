use crate::config::types::{
    CacheConfig, Config, EndpointsConfig, FunnelConfig, HttpConfig, RetryConfig, SearchEntry,
};
use crate::model::StrategyKind;
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Highest page number a search may request
pub const MAX_PAGES: u32 = 10;

/// Highest attempt count allowed for any strategy
pub const MAX_ATTEMPTS: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_funnel_config(&config.funnel)?;
    validate_retry_config(&config.retry)?;
    validate_cache_config(&config.cache)?;
    validate_http_config(&config.http)?;
    validate_endpoints(&config.endpoints)?;
    validate_searches(&config.search)?;
    Ok(())
}

fn validate_funnel_config(config: &FunnelConfig) -> ConfigResult<()> {
    if config.max_concurrent_targets < 1 || config.max_concurrent_targets > 32 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-targets must be between 1 and 32, got {}",
            config.max_concurrent_targets
        )));
    }

    if config.challenge_limit < 1 {
        return Err(ConfigError::Validation(
            "challenge-limit must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> ConfigResult<()> {
    validate_attempts("max-attempts", config.max_attempts)?;

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must be >= base-delay-ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    for (name, attempts) in &config.per_strategy {
        match StrategyKind::from_config_name(name) {
            Some(kind) if kind.is_remote() => {}
            _ => return Err(ConfigError::UnknownStrategy(name.clone())),
        }
        validate_attempts(&format!("per-strategy.{}", name), *attempts)?;
    }

    Ok(())
}

fn validate_attempts(field: &str, attempts: u32) -> ConfigResult<()> {
    if attempts < 1 || attempts > MAX_ATTEMPTS {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and {}, got {}",
            field, MAX_ATTEMPTS, attempts
        )));
    }
    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> ConfigResult<()> {
    if config.persist && config.path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "cache path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> ConfigResult<()> {
    if config.timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "HTTP timeouts must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_endpoints(config: &EndpointsConfig) -> ConfigResult<()> {
    for (name, value) in [
        ("amazon", &config.amazon),
        ("mercadolibre-listings", &config.mercadolibre_listings),
        ("mercadolibre-api", &config.mercadolibre_api),
    ] {
        let url = Url::parse(value).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid {} endpoint '{}': {}", name, value, e))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::InvalidUrl(format!(
                "Endpoint '{}' must use HTTP or HTTPS",
                value
            )));
        }
    }
    Ok(())
}

fn validate_searches(searches: &[SearchEntry]) -> ConfigResult<()> {
    for entry in searches {
        if entry.query.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} search query cannot be empty",
                entry.platform
            )));
        }

        if entry.pages < 1 || entry.pages > MAX_PAGES {
            return Err(ConfigError::Validation(format!(
                "pages for '{}' must be between 1 and {}, got {}",
                entry.query, MAX_PAGES, entry.pages
            )));
        }

        if let Some(region) = &entry.region {
            if region.len() != 2 || !region.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ConfigError::Validation(format!(
                    "region must be a two-letter country code, got '{}'",
                    region
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Platform;

    fn search(query: &str, pages: u32) -> SearchEntry {
        SearchEntry {
            platform: Platform::Amazon,
            query: query.to_string(),
            pages,
            region: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut config = Config::default();
        config.funnel.max_concurrent_targets = 0;
        assert!(validate(&config).is_err());

        config.funnel.max_concurrent_targets = 33;
        assert!(validate(&config).is_err());

        config.funnel.max_concurrent_targets = 32;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_challenge_limit_must_be_positive() {
        let mut config = Config::default();
        config.funnel.challenge_limit = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_max_delay_below_base() {
        let mut config = Config::default();
        config.retry.base_delay_ms = 5000;
        config.retry.max_delay_ms = 1000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_attempt_bounds() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(validate(&config).is_err());

        config.retry.max_attempts = 11;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_per_strategy_names() {
        let mut config = Config::default();
        config.retry.per_strategy.insert("desktop-fetch".to_string(), 5);
        assert!(validate(&config).is_ok());

        config.retry.per_strategy.insert("cached".to_string(), 2);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::UnknownStrategy(_))
        ));

        config.retry.per_strategy.clear();
        config.retry.per_strategy.insert("carrier-pigeon".to_string(), 2);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_per_strategy_attempt_bounds() {
        let mut config = Config::default();
        config.retry.per_strategy.insert("mobile-fetch".to_string(), 0);
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut config = Config::default();
        config.endpoints.amazon = "not a url".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        config.endpoints.amazon = "ftp://example.com".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_search_validation() {
        let mut config = Config::default();
        config.search.push(search("laptop", 10));
        assert!(validate(&config).is_ok());

        config.search.push(search("   ", 1));
        assert!(validate(&config).is_err());

        config.search.pop();
        config.search.push(search("tablet", 11));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_region_format() {
        let mut config = Config::default();
        let mut entry = search("laptop", 1);
        entry.region = Some("colombia".to_string());
        config.search.push(entry);
        assert!(validate(&config).is_err());
    }
}

//! Catalog configuration
//!
//! Loaded from environment variables with defaults that match the
//! production service:
//! - `PINS_ASSET_CACHE_TTL_SECS` (600)
//! - `PINS_SEARCH_CACHE_TTL_SECS` (120)
//! - `PINS_TAG_RETRY_LIMIT` (5)
//! - `PINS_SEARCH_DEFAULT_LIMIT` (10)
//! - `PINS_SEARCH_MAX_LIMIT` (100)

use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Lifetime of a cached single-asset entry.
    pub asset_cache_ttl: Duration,
    /// Lifetime of a cached search result page.
    pub search_cache_ttl: Duration,
    /// Attempts per tag before a ledger increment gives up.
    pub tag_retry_limit: u32,
    pub default_search_limit: u32,
    pub max_search_limit: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            asset_cache_ttl: Duration::from_secs(600),
            search_cache_ttl: Duration::from_secs(120),
            tag_retry_limit: 5,
            default_search_limit: 10,
            max_search_limit: 100,
        }
    }
}

impl CatalogConfig {
    /// Create CatalogConfig from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let asset_cache_ttl = env_parse::<u64>("PINS_ASSET_CACHE_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.asset_cache_ttl);
        let search_cache_ttl = env_parse::<u64>("PINS_SEARCH_CACHE_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.search_cache_ttl);

        Self {
            asset_cache_ttl,
            search_cache_ttl,
            tag_retry_limit: env_parse("PINS_TAG_RETRY_LIMIT").unwrap_or(defaults.tag_retry_limit),
            default_search_limit: env_parse("PINS_SEARCH_DEFAULT_LIMIT")
                .unwrap_or(defaults.default_search_limit),
            max_search_limit: env_parse("PINS_SEARCH_MAX_LIMIT")
                .unwrap_or(defaults.max_search_limit),
        }
    }

    /// Reject settings the catalog cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asset_cache_ttl.is_zero() {
            return Err(invalid("asset_cache_ttl", "must be greater than zero"));
        }
        if self.search_cache_ttl.is_zero() {
            return Err(invalid("search_cache_ttl", "must be greater than zero"));
        }
        if self.tag_retry_limit == 0 {
            return Err(invalid("tag_retry_limit", "must be at least 1"));
        }
        if self.default_search_limit == 0 {
            return Err(invalid("default_search_limit", "must be at least 1"));
        }
        if self.default_search_limit > self.max_search_limit {
            return Err(invalid(
                "default_search_limit",
                "must not exceed max_search_limit",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

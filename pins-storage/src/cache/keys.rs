//! Cache namespaces and key derivation.

use std::collections::BTreeMap;
use std::fmt;

use pins_core::{AssetFilter, AssetId, PageRequest};

/// Independent groups of cache entries with their own key prefix and TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Single-asset entries, keyed by asset id.
    Asset,
    /// Search result pages, keyed by canonical query.
    Search,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 2] = [CacheNamespace::Asset, CacheNamespace::Search];

    pub fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::Asset => "assets:id:",
            CacheNamespace::Search => "assets:search:",
        }
    }

    /// Metric and log label.
    pub fn label(&self) -> &'static str {
        match self {
            CacheNamespace::Asset => "asset",
            CacheNamespace::Search => "search",
        }
    }

    /// Full backend key for a namespace-relative key.
    pub fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix(), key)
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Namespace-relative key of a single asset.
pub fn asset_key(id: &AssetId) -> String {
    id.to_string()
}

/// Order-independent key for a set of query parameters: pairs are sorted by
/// name and joined as `name:value` with `:`. Backslashes and colons inside a
/// name or value are escaped, so distinct parameter sets never share a key.
pub fn canonical_search_key<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    sorted
        .iter()
        .map(|(k, v)| format!("{}:{}", escape_component(k), escape_component(v)))
        .collect::<Vec<_>>()
        .join(":")
}

fn escape_component(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || c == ':' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Namespace-relative key of a search page.
pub fn search_key(filter: &AssetFilter, page: PageRequest) -> String {
    canonical_search_key(filter.query_params(page))
}

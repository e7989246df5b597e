//! # Cache Key Generator
//!
//! Turns a [`SearchQuery`] into a canonical, order-independent cache key, and
//! a caller identity into the rate limiter's client key.
//!
//! Text fields are trimmed and lower-cased; courier services are lower-cased,
//! sorted and de-duplicated. Keys longer than `max_length` are replaced by a
//! SHA-256 digest so the store never holds unbounded keys.

use crate::core::types::SearchQuery;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

const DEFAULT_PREFIX: &str = "pickup";
const DEFAULT_MAX_LENGTH: usize = 250;
const ANONYMOUS_CLIENT: &str = "anonymous";

/// Canonical lookup key shared by the cache store and the coalescer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Output of normalization: where to cache and whom to rate limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub cache_key: CacheKey,
    pub client_key: String,
}

/// Pure, deterministic query normalizer
#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    prefix: String,
    max_length: usize,
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl QueryNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Normalize both halves in one call
    pub fn normalize(&self, query: &SearchQuery, caller: Option<&str>) -> NormalizedQuery {
        NormalizedQuery {
            cache_key: self.cache_key(query),
            client_key: Self::client_key(caller),
        }
    }

    pub fn cache_key(&self, query: &SearchQuery) -> CacheKey {
        let mut services: Vec<String> = query
            .courier_services
            .iter()
            .map(|s| canonical(s))
            .filter(|s| !s.is_empty())
            .collect();
        services.sort();
        services.dedup();

        let key = format!(
            "{}:city={}|postal={}|provider={}|services={}",
            self.prefix,
            query.city().map(canonical).unwrap_or_default(),
            query.postal_code().map(canonical).unwrap_or_default(),
            query.provider().map(canonical).unwrap_or_default(),
            services.join(","),
        );

        CacheKey(self.truncate_key(key))
    }

    /// Rate limiting identity; derived from who is calling, never from the query
    pub fn client_key(caller: Option<&str>) -> String {
        caller
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(ANONYMOUS_CLIENT)
            .to_string()
    }

    fn truncate_key(&self, key: String) -> String {
        if key.len() <= self.max_length {
            return key;
        }
        let digest = Sha256::digest(key.as_bytes());
        format!("{}:hash:{}", self.prefix, hex::encode(digest))
    }
}

fn canonical(value: &str) -> String {
    value.trim().to_lowercase()
}

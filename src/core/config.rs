//! # Configuration Module
//!
//! Configuration structures and loading for the lookup gateway.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Every field defaulted, so an empty document is a valid configuration
//! - Environment variable overrides (`GATEWAY_<SECTION>_<FIELD>`)
//! - Validation that reports every problem at once

use crate::core::circuit_breaker::CircuitBreakerConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::middleware::rate_limiting::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Cache, rate limiter and breaker tuning
    pub lookup: LookupConfig,

    /// Courier search service connection
    pub upstream: UpstreamConfig,

    /// Logging settings
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayConfig = serde_json::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise start from defaults.
    /// Environment overrides and validation apply either way.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
            if is_json {
                Self::load_from_json(path).await
            } else {
                Self::load_from_file(path).await
            }
        } else {
            let mut config = Self::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: GATEWAY_<SECTION>_<FIELD>
    /// For example: GATEWAY_LOOKUP_CACHE_TTL_MS=30000
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        use std::env;

        fn parse<T: std::str::FromStr>(name: &str, raw: &str) -> GatewayResult<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.parse()
                .map_err(|e| GatewayError::config(format!("Invalid {}: {}", name, e)))
        }

        fn duration(name: &str, raw: &str) -> GatewayResult<Duration> {
            humantime::parse_duration(raw)
                .map_err(|e| GatewayError::config(format!("Invalid {}: {}", name, e)))
        }

        // Server configuration overrides
        if let Ok(port) = env::var("GATEWAY_SERVER_HTTP_PORT") {
            self.server.http_port = parse("GATEWAY_SERVER_HTTP_PORT", &port)?;
        }
        if let Ok(addr) = env::var("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        // Lookup tuning overrides
        if let Ok(v) = env::var("GATEWAY_LOOKUP_CACHE_TTL_MS") {
            self.lookup.cache_ttl_ms = parse("GATEWAY_LOOKUP_CACHE_TTL_MS", &v)?;
        }
        if let Ok(v) = env::var("GATEWAY_LOOKUP_RATE_LIMIT_ENABLED") {
            self.lookup.rate_limit_enabled = parse("GATEWAY_LOOKUP_RATE_LIMIT_ENABLED", &v)?;
        }
        if let Ok(v) = env::var("GATEWAY_LOOKUP_RATE_LIMIT_WINDOW_MS") {
            self.lookup.rate_limit_window_ms = parse("GATEWAY_LOOKUP_RATE_LIMIT_WINDOW_MS", &v)?;
        }
        if let Ok(v) = env::var("GATEWAY_LOOKUP_RATE_LIMIT_MAX") {
            self.lookup.rate_limit_max = parse("GATEWAY_LOOKUP_RATE_LIMIT_MAX", &v)?;
        }
        if let Ok(v) = env::var("GATEWAY_LOOKUP_BREAKER_FAILURE_THRESHOLD") {
            self.lookup.breaker_failure_threshold =
                parse("GATEWAY_LOOKUP_BREAKER_FAILURE_THRESHOLD", &v)?;
        }
        if let Ok(v) = env::var("GATEWAY_LOOKUP_BREAKER_COOLDOWN_MS") {
            self.lookup.breaker_cooldown_ms = parse("GATEWAY_LOOKUP_BREAKER_COOLDOWN_MS", &v)?;
        }
        if let Ok(v) = env::var("GATEWAY_LOOKUP_UPSTREAM_TIMEOUT") {
            self.lookup.upstream_timeout = duration("GATEWAY_LOOKUP_UPSTREAM_TIMEOUT", &v)?;
        }

        // Upstream connection overrides
        if let Ok(url) = env::var("GATEWAY_UPSTREAM_BASE_URL") {
            self.upstream.base_url = url;
        }
        if let Ok(token) = env::var("GATEWAY_UPSTREAM_API_TOKEN") {
            self.upstream.api_token = Some(token);
        }

        // Logging configuration overrides
        if let Ok(level) = env::var("GATEWAY_LOG_LEVEL") {
            self.observability.logging.level = level;
        }
        if let Ok(format) = env::var("GATEWAY_LOG_FORMAT") {
            self.observability.logging.format = format;
        }

        Ok(())
    }

    /// Comprehensive configuration validation with detailed error messages
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }
        if self.server.max_request_size == 0 {
            errors.push("max_request_size must be greater than 0".to_string());
        }

        if self.lookup.cache_ttl_ms == 0 {
            errors.push("cache_ttl_ms must be greater than 0".to_string());
        }
        if self.lookup.rate_limit_enabled {
            if self.lookup.rate_limit_window_ms == 0 {
                errors.push("rate_limit_window_ms must be greater than 0".to_string());
            }
            if self.lookup.rate_limit_max == 0 {
                errors.push("rate_limit_max must be greater than 0".to_string());
            }
        }
        if self.lookup.upstream_timeout.is_zero() {
            errors.push("upstream_timeout must be greater than 0".to_string());
        }
        if self.lookup.cache_max_entries == 0 {
            errors.push("cache_max_entries must be greater than 0".to_string());
        }

        if let Err(e) = Url::parse(&self.upstream.base_url) {
            errors.push(format!(
                "Invalid upstream base_url '{}': {}",
                self.upstream.base_url, e
            ));
        }
        if !self.upstream.search_path.starts_with('/') {
            errors.push(format!(
                "upstream search_path must start with '/', got: {}",
                self.upstream.search_path
            ));
        }

        match self.observability.logging.format.to_lowercase().as_str() {
            "json" | "text" => {}
            _ => errors.push(format!(
                "Invalid log format: {}",
                self.observability.logging.format
            )),
        }

        if !errors.is_empty() {
            return Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            max_request_size: 64 * 1024,
        }
    }
}

/// Lookup pipeline tuning. Durations the storefront team configures in
/// milliseconds keep their `_ms` names; the remaining knobs take humantime strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Freshness window for cache entries
    pub cache_ttl_ms: u64,

    pub rate_limit_enabled: bool,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max: u32,

    /// 0 keeps the breaker inert
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_ms: u64,

    /// Upper bound on a single upstream call; expiry counts as a failure
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,

    /// Bound on distinct cached keys
    pub cache_max_entries: usize,

    /// How often the background sweep drops expired cache entries
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 600_000,
            rate_limit_enabled: false,
            rate_limit_window_ms: 60_000,
            rate_limit_max: 120,
            breaker_failure_threshold: 0,
            breaker_cooldown_ms: 60_000,
            upstream_timeout: Duration::from_secs(5),
            cache_max_entries: 10_000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl LookupConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            enabled: self.rate_limit_enabled,
            window: Duration::from_millis(self.rate_limit_window_ms),
            max_requests: self.rate_limit_max,
        }
    }

    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            cooldown: Duration::from_millis(self.breaker_cooldown_ms),
        }
    }
}

/// Courier search service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub search_path: String,
    /// Bearer token; obtaining and refreshing it happens outside the gateway
    pub api_token: Option<String>,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.courier.example".to_string(),
            search_path: "/points/map".to_string(),
            api_token: None,
            user_agent: concat!("pickup-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// `json` or `text`
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

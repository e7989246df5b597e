//! # Rate Limiting
//!
//! Fixed-window request counter per client key.
//!
//! On every check: if the current instant is past the client's `window_reset_at`,
//! the count restarts at zero and the window moves to `now + window`; the count is
//! then incremented and the request rejected once it exceeds `max_requests`.
//!
//! A burst straddling a window edge can admit up to `2 × max_requests` within a
//! span slightly longer than one window. That is the accepted behaviour of a fixed
//! window and is kept as is.
//!
//! Per-key state lives in a `DashMap`; the read-compare-increment sequence runs
//! while holding that key's entry guard, which makes it atomic with respect to
//! other callers using the same key.
//!
//! ## Usage Example
//! ```rust,ignore
//! let limiter = RateLimiter::new(RateLimitConfig::default(), Arc::new(SystemClock));
//! let result = limiter.check("203.0.113.7");
//! if !result.allowed {
//!     // respond 429 with result.retry_after
//! }
//! ```

use crate::core::clock::Clock;
use crate::observability::metrics::RATE_LIMITED_TOTAL;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Configuration for rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// When false every request is admitted and no state is kept
    pub enabled: bool,
    /// Length of one counting window
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Requests admitted per client per window
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: Duration::from_secs(60),
            max_requests: 120,
        }
    }
}

/// Rate limit decision result
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    /// Set only on rejection: time until the client's window resets
    pub retry_after: Option<Duration>,
}

impl RateLimitResult {
    fn unlimited() -> Self {
        Self {
            allowed: true,
            remaining: u32::MAX,
            retry_after: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitState {
    count: u32,
    window_reset_at: Instant,
}

#[derive(Debug, Default)]
pub struct RateLimitMetrics {
    pub requests_allowed: AtomicU64,
    pub requests_denied: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub enabled: bool,
    pub tracked_clients: usize,
    pub requests_allowed: u64,
    pub requests_denied: u64,
}

/// Per-client fixed-window limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    states: DashMap<String, RateLimitState>,
    metrics: RateLimitMetrics,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            states: DashMap::new(),
            metrics: RateLimitMetrics::default(),
            clock,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Count one request for `client_key` and decide whether it may proceed
    pub fn check(&self, client_key: &str) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::unlimited();
        }

        let now = self.clock.now();
        let window = self.config.window;

        let mut state = self
            .states
            .entry(client_key.to_string())
            .or_insert_with(|| RateLimitState {
                count: 0,
                window_reset_at: now + window,
            });

        if now > state.window_reset_at {
            state.count = 0;
            state.window_reset_at = now + window;
        }
        state.count = state.count.saturating_add(1);

        let result = if state.count > self.config.max_requests {
            RateLimitResult {
                allowed: false,
                remaining: 0,
                retry_after: Some(state.window_reset_at.saturating_duration_since(now)),
            }
        } else {
            RateLimitResult {
                allowed: true,
                remaining: self.config.max_requests - state.count,
                retry_after: None,
            }
        };
        drop(state);

        if result.allowed {
            self.metrics.requests_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.requests_denied.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(RATE_LIMITED_TOTAL).increment(1);
            debug!(client = %client_key, retry_after = ?result.retry_after, "Rate limit exceeded");
        }

        result
    }

    /// Forget a single client's window
    pub fn reset_limit(&self, client_key: &str) {
        self.states.remove(client_key);
    }

    /// Drop client states whose window ended more than one full window ago.
    /// Such a client would be reset on its next request anyway.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let window = self.config.window;
        let before = self.states.len();
        self.states
            .retain(|_, state| now.saturating_duration_since(state.window_reset_at) <= window);
        before - self.states.len()
    }

    pub fn get_metrics(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            enabled: self.config.enabled,
            tracked_clients: self.states.len(),
            requests_allowed: self.metrics.requests_allowed.load(Ordering::Relaxed),
            requests_denied: self.metrics.requests_denied.load(Ordering::Relaxed),
        }
    }

    pub fn get_config(&self) -> &RateLimitConfig {
        &self.config
    }
}

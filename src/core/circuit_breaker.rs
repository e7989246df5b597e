//! Circuit Breaker Implementation
//!
//! One breaker guards the whole courier upstream. It has two observable states:
//!
//! - **Closed**: upstream calls are permitted
//! - **Open**: upstream calls are skipped until `open_until` has passed
//!
//! There is no half-open probe state. Once the cooldown elapses the breaker simply
//! behaves as closed again; the consecutive-failure counter is *not* cleared by the
//! cooldown, so a single further failure re-opens it straight away. Only a
//! successful upstream call resets the counter.
//!
//! A `failure_threshold` of 0 keeps the breaker permanently inert: failures are
//! still counted, but the circuit never opens.
//!
//! The read-compare-open sequence runs under one mutex so concurrent outcomes
//! cannot interleave between counting a failure and opening the circuit.

use crate::core::clock::Clock;
use crate::observability::metrics::BREAKER_OPENED_TOTAL;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerState {
    Closed,
    Open,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening; 0 disables opening entirely
    pub failure_threshold: u32,

    /// How long the circuit stays open once tripped
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Metrics collected by the circuit breaker
///
/// Uses atomic operations for lock-free updates from multiple threads
#[derive(Debug, Default)]
pub struct CircuitBreakerMetrics {
    pub successful_calls: AtomicU64,
    pub failed_calls: AtomicU64,
    /// Calls skipped because the circuit was open
    pub rejected_calls: AtomicU64,
    pub circuit_opened_count: AtomicU64,
}

impl CircuitBreakerMetrics {
    pub fn snapshot(&self) -> CircuitBreakerMetricsSnapshot {
        CircuitBreakerMetricsSnapshot {
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            circuit_opened_count: self.circuit_opened_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerMetricsSnapshot {
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    pub circuit_opened_count: u64,
}

/// Point-in-time view of the breaker for admin/stats endpoints
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitBreakerState,
    pub consecutive_failures: u32,
    /// Remaining open time, present only while open
    pub open_for_ms: Option<u64>,
    pub metrics: CircuitBreakerMetricsSnapshot,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Process-wide breaker for the courier upstream
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: CircuitBreakerConfig,
    metrics: Arc<CircuitBreakerMetrics>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
            metrics: Arc::new(CircuitBreakerMetrics::default()),
            clock,
        }
    }

    /// `true` while `open_until` lies in the future
    pub fn is_open(&self) -> bool {
        let now = self.clock.now();
        self.state
            .lock()
            .open_until
            .map_or(false, |until| until > now)
    }

    /// Gate an upstream call, counting it as rejected when the circuit is open
    pub fn can_proceed(&self) -> bool {
        if self.is_open() {
            self.metrics.rejected_calls.fetch_add(1, Ordering::Relaxed);
            false
        } else {
            true
        }
    }

    /// A successful upstream outcome fully resets the failure counter
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        self.metrics.successful_calls.fetch_add(1, Ordering::Relaxed);

        if state.consecutive_failures > 0 {
            info!(
                previous_failures = state.consecutive_failures,
                "Upstream recovered, resetting circuit breaker"
            );
        }
        state.consecutive_failures = 0;
    }

    /// Count a failed upstream outcome and open the circuit once the threshold is hit
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.metrics.failed_calls.fetch_add(1, Ordering::Relaxed);

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        let threshold = self.config.failure_threshold;
        if threshold > 0 && state.consecutive_failures >= threshold {
            state.open_until = Some(now + self.config.cooldown);
            self.metrics.circuit_opened_count.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(BREAKER_OPENED_TOTAL).increment(1);
            warn!(
                consecutive_failures = state.consecutive_failures,
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                "Circuit breaker opened"
            );
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    pub fn state(&self) -> CircuitBreakerState {
        if self.is_open() {
            CircuitBreakerState::Open
        } else {
            CircuitBreakerState::Closed
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = self.clock.now();
        let state = self.state.lock();
        let open_for = state
            .open_until
            .filter(|until| *until > now)
            .map(|until| until.duration_since(now));

        CircuitBreakerSnapshot {
            state: if open_for.is_some() {
                CircuitBreakerState::Open
            } else {
                CircuitBreakerState::Closed
            },
            consecutive_failures: state.consecutive_failures,
            open_for_ms: open_for.map(|d| d.as_millis() as u64),
            metrics: self.metrics.snapshot(),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<CircuitBreakerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Manually open the circuit for one cooldown (operator override)
    pub fn force_open(&self) {
        let mut state = self.state.lock();
        state.open_until = Some(self.clock.now() + self.config.cooldown);
        self.metrics.circuit_opened_count.fetch_add(1, Ordering::Relaxed);
        info!("Circuit breaker forced open");
    }

    /// Manually close the circuit and clear the failure counter
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = BreakerState::default();
        info!("Circuit breaker reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn breaker(threshold: u32, cooldown_ms: u64) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(cooldown_ms),
        };
        (CircuitBreaker::new(config, clock.clone()), clock)
    }

    #[test]
    fn test_initial_state_is_closed() {
        let (cb, _) = breaker(3, 1_000);
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert!(cb.can_proceed());
    }

    #[test]
    fn test_opens_at_threshold() {
        let (cb, _) = breaker(2, 1_000);

        cb.record_failure();
        assert!(!cb.is_open());

        cb.record_failure();
        assert!(cb.is_open());
        assert!(!cb.can_proceed());
        assert_eq!(cb.metrics().snapshot().rejected_calls, 1);
        assert_eq!(cb.metrics().snapshot().circuit_opened_count, 1);
    }

    #[test]
    fn test_closes_after_cooldown_without_resetting_counter() {
        let (cb, clock) = breaker(2, 1_000);
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_open());

        clock.advance(Duration::from_millis(1_000));
        assert!(!cb.is_open());
        assert_eq!(cb.consecutive_failures(), 2);

        // One more failure re-opens immediately
        cb.record_failure();
        assert!(cb.is_open());
        assert_eq!(cb.consecutive_failures(), 3);
    }

    #[test]
    fn test_success_fully_resets_counter() {
        let (cb, _) = breaker(3, 1_000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.consecutive_failures(), 0);

        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
    }

    #[test]
    fn test_zero_threshold_never_opens() {
        let (cb, _) = breaker(0, 1_000);
        for _ in 0..50 {
            cb.record_failure();
        }
        assert!(!cb.is_open());
        assert_eq!(cb.consecutive_failures(), 50);
        assert_eq!(cb.metrics().snapshot().circuit_opened_count, 0);
    }

    #[test]
    fn test_snapshot_reports_remaining_open_time() {
        let (cb, clock) = breaker(1, 2_000);
        cb.record_failure();
        clock.advance(Duration::from_millis(500));

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitBreakerState::Open);
        assert_eq!(snapshot.open_for_ms, Some(1_500));
        assert_eq!(snapshot.metrics.failed_calls, 1);
    }

    #[test]
    fn test_manual_override() {
        let (cb, _) = breaker(0, 1_000);
        cb.force_open();
        assert!(cb.is_open());

        cb.reset();
        assert!(!cb.is_open());
        assert_eq!(cb.consecutive_failures(), 0);
    }
}

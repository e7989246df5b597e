//! # Pickup Lookup Gateway
//!
//! Orchestrates one pickup-point search:
//!
//! 1. validate the query
//! 2. normalize it into a cache key and a rate-limit client key
//! 3. apply the per-client rate limit
//! 4. serve a fresh cache entry (or "not modified" when the caller's fingerprint matches)
//! 5. with the breaker open, skip upstream and serve stale cache or synthetic points
//! 6. otherwise make one coalesced, time-bounded upstream call per key
//! 7. degrade to synthetic points when upstream fails or returns nothing
//! 8. store whatever is served and report its freshness
//!
//! Only validation and rate-limit conditions surface as errors. Upstream
//! trouble always becomes a degraded success.
//!
//! All shared state (cache, in-flight registry, limiter windows, breaker) is
//! owned by one [`PickupLookupGateway`] value, so independent instances never
//! interfere with each other.

use crate::caching::{CacheEntry, CacheStats, CacheStore, CoalescerStats, QueryNormalizer, RequestCoalescer};
use crate::core::circuit_breaker::{CircuitBreaker, CircuitBreakerSnapshot};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::{GatewayConfig, LookupConfig};
use crate::core::error::{GatewayError, GatewayResult, UpstreamError};
use crate::core::types::{LookupSource, PickupPoint, SearchQuery, SearchResponse};
use crate::gateway::fallback::synthetic_points;
use crate::observability::metrics::{LOOKUPS_TOTAL, UPSTREAM_CALLS_TOTAL};
use crate::middleware::rate_limiting::{RateLimitMetricsSnapshot, RateLimiter};
use crate::upstream::{map_points, search_request, UpstreamClient};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn, Instrument, Span};
use uuid::Uuid;

/// One incoming search plus the caller context the HTTP layer extracted
#[derive(Debug, Clone, Default)]
pub struct LookupRequest {
    pub query: SearchQuery,
    /// Caller identity used for rate limiting (usually the client address)
    pub caller: Option<String>,
    /// Fingerprint the caller already holds
    pub if_none_match: Option<String>,
}

impl LookupRequest {
    pub fn new(query: SearchQuery) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    pub fn from_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn if_none_match(mut self, fingerprint: impl Into<String>) -> Self {
        self.if_none_match = Some(fingerprint.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupReply {
    pub response: SearchResponse,
    pub fingerprint: String,
    pub max_age: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(LookupReply),
    /// Fresh entry matches the caller's fingerprint; no payload
    NotModified { fingerprint: String, max_age: Duration },
}

impl LookupOutcome {
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::Found(reply) => &reply.fingerprint,
            Self::NotModified { fingerprint, .. } => fingerprint,
        }
    }

    pub fn max_age(&self) -> Duration {
        match self {
            Self::Found(reply) => reply.max_age,
            Self::NotModified { max_age, .. } => *max_age,
        }
    }

    /// The response body, `None` for "not modified"
    pub fn response(&self) -> Option<&SearchResponse> {
        match self {
            Self::Found(reply) => Some(&reply.response),
            Self::NotModified { .. } => None,
        }
    }

    pub fn into_response(self) -> Option<SearchResponse> {
        match self {
            Self::Found(reply) => Some(reply.response),
            Self::NotModified { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub cache: CacheStats,
    pub circuit_breaker: CircuitBreakerSnapshot,
    pub rate_limiter: RateLimitMetricsSnapshot,
    pub coalescer: CoalescerStats,
}

pub struct PickupLookupGateway {
    config: LookupConfig,
    search_path: String,
    normalizer: QueryNormalizer,
    cache: Arc<CacheStore>,
    coalescer: RequestCoalescer<Vec<PickupPoint>>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    upstream: Arc<dyn UpstreamClient>,
    clock: Arc<dyn Clock>,
}

impl PickupLookupGateway {
    pub fn new(config: &GatewayConfig, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self::with_clock(config, upstream, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &GatewayConfig,
        upstream: Arc<dyn UpstreamClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lookup = config.lookup.clone();
        Self {
            search_path: config.upstream.search_path.clone(),
            normalizer: QueryNormalizer::new(),
            cache: Arc::new(CacheStore::new(lookup.cache_max_entries, clock.clone())),
            coalescer: RequestCoalescer::new(),
            limiter: Arc::new(RateLimiter::new(lookup.rate_limit(), clock.clone())),
            breaker: Arc::new(CircuitBreaker::new(lookup.circuit_breaker(), clock.clone())),
            upstream,
            clock,
            config: lookup,
        }
    }

    #[instrument(
        name = "pickup_lookup",
        skip(self, request),
        fields(
            request_id = %Uuid::new_v4(),
            city = request.query.city().unwrap_or_default(),
            source = tracing::field::Empty,
        )
    )]
    pub async fn lookup(&self, request: LookupRequest) -> GatewayResult<LookupOutcome> {
        request.query.validate()?;

        let normalized = self
            .normalizer
            .normalize(&request.query, request.caller.as_deref());

        let decision = self.limiter.check(&normalized.client_key);
        if !decision.allowed {
            let retry_after = decision.retry_after.unwrap_or_default();
            warn!(
                client = %normalized.client_key,
                retry_in_ms = retry_after.as_millis() as u64,
                "Lookup rate limited"
            );
            return Err(GatewayError::rate_limited(retry_after));
        }

        let key = normalized.cache_key.as_str();

        if let Some(entry) = self.cache.get(key) {
            let max_age = entry.remaining(self.clock.now());
            if request.if_none_match.as_deref() == Some(entry.fingerprint.as_str()) {
                debug!(key = %key, "Fingerprint matches fresh entry");
                record_source(LookupSource::Cache);
                return Ok(LookupOutcome::NotModified {
                    fingerprint: entry.fingerprint,
                    max_age,
                });
            }
            debug!(key = %key, "Cache hit");
            return Ok(self.reply(entry, LookupSource::Cache, max_age));
        }

        if !self.breaker.can_proceed() {
            return Ok(match self.cache.get_stale(key) {
                Some(stale) => {
                    debug!(key = %key, "Breaker open, reusing stale entry");
                    self.store(key, stale.points, LookupSource::CacheBreakerOpen)
                }
                None => {
                    debug!(key = %key, "Breaker open, serving synthetic points");
                    self.store(
                        key,
                        synthetic_points(&request.query),
                        LookupSource::MockBreakerOpen,
                    )
                }
            });
        }

        let work = self.upstream_call(request.query.clone()).in_current_span();
        let outcome = self.coalescer.join_or_start(key, work).await;

        let (points, source) = match outcome {
            Ok(points) if !points.is_empty() => (points, LookupSource::Upstream),
            Ok(_) => {
                info!(key = %key, "Upstream returned no usable points");
                (synthetic_points(&request.query), LookupSource::MockFallback)
            }
            Err(error) => {
                warn!(key = %key, error = %error, "Upstream lookup failed, serving synthetic points");
                (synthetic_points(&request.query), LookupSource::MockFallback)
            }
        };

        Ok(self.store(key, points, source))
    }

    /// Build the coalesced unit of work: call, bound by timeout, map, report to breaker
    fn upstream_call(
        &self,
        query: SearchQuery,
    ) -> impl std::future::Future<Output = Result<Vec<PickupPoint>, UpstreamError>> + Send + 'static
    {
        let upstream = Arc::clone(&self.upstream);
        let breaker = Arc::clone(&self.breaker);
        let path = self.search_path.clone();
        let timeout = self.config.upstream_timeout;

        async move {
            let options = search_request(&query);
            let outcome =
                match tokio::time::timeout(timeout, upstream.authenticated_request(&path, options))
                    .await
                {
                    Err(_) => Err(UpstreamError::Timeout(timeout)),
                    Ok(Err(error)) => Err(error),
                    Ok(Ok(response)) if !response.ok => Err(UpstreamError::Status {
                        status: response.status,
                    }),
                    Ok(Ok(response)) => Ok(map_points(&response.body, &query)),
                };

            match &outcome {
                Ok(points) => {
                    breaker.record_success();
                    debug!(points = points.len(), "Upstream lookup succeeded");
                    metrics::counter!(UPSTREAM_CALLS_TOTAL, "outcome" => "success")
                        .increment(1);
                }
                Err(error) => {
                    if error.counts_as_failure() {
                        breaker.record_failure();
                    }
                    let label = match error {
                        UpstreamError::Timeout(_) => "timeout",
                        UpstreamError::Status { .. } => "status",
                        UpstreamError::Decode(_) => "decode",
                        _ => "network",
                    };
                    metrics::counter!(UPSTREAM_CALLS_TOTAL, "outcome" => label)
                        .increment(1);
                }
            }
            outcome
        }
    }

    fn store(&self, key: &str, points: Vec<PickupPoint>, source: LookupSource) -> LookupOutcome {
        let ttl = self.config.cache_ttl();
        let entry = self.cache.put(key, points, ttl);
        self.reply(entry, source, ttl)
    }

    fn reply(&self, entry: CacheEntry, source: LookupSource, max_age: Duration) -> LookupOutcome {
        record_source(source);
        LookupOutcome::Found(LookupReply {
            response: SearchResponse {
                count: entry.points.len(),
                points: entry.points,
                source,
                ttl: Some(max_age.as_millis() as u64),
            },
            fingerprint: entry.fingerprint,
            max_age,
        })
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            cache: self.cache.stats(),
            circuit_breaker: self.breaker.snapshot(),
            rate_limiter: self.limiter.get_metrics(),
            coalescer: self.coalescer.stats(),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Background expiry sweep for the cache and idle limiter windows
    pub fn spawn_maintenance(&self) -> Vec<JoinHandle<()>> {
        let every = self.config.sweep_interval;
        let cache_sweeper = self.cache.spawn_sweeper(every);

        let limiter = Arc::clone(&self.limiter);
        let limiter_cleanup = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.cleanup_expired();
                if removed > 0 {
                    debug!(removed, "Dropped idle rate limit windows");
                }
            }
        });

        vec![cache_sweeper, limiter_cleanup]
    }
}

fn record_source(source: LookupSource) {
    Span::current().record("source", source.as_str());
    metrics::counter!(LOOKUPS_TOTAL, "source" => source.as_str()).increment(1);
}

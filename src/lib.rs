//! # Pickup Gateway - Core Library Crate
//!
//! Resilient pickup-point lookup gateway sitting between a storefront and a
//! courier network's search API. Lookups are normalized, rate limited per
//! client, cached with content fingerprints, coalesced per key, and shielded
//! by a circuit breaker that degrades to stale or synthetic data.

/// Error types, configuration, clock, domain types and the circuit breaker
pub mod core;

/// Query normalization, TTL cache store and request coalescing
pub mod caching;

/// Per-client fixed-window rate limiting
pub mod middleware;

/// Courier search API boundary: client trait, reqwest client, response mapping
pub mod upstream;

/// Lookup orchestration and the HTTP server
pub mod gateway;

/// Structured logging and Prometheus metrics
pub mod observability;

/// Main error type used throughout the gateway
pub use core::error::{GatewayError, GatewayResult, UpstreamError};

/// Main configuration structure for the gateway
pub use core::config::GatewayConfig;

pub use core::types::{LookupSource, PickupPoint, SearchQuery, SearchResponse};

/// Primary entry points
pub use gateway::{GatewayServer, LookupOutcome, LookupRequest, PickupLookupGateway, ServerState};
pub use upstream::{HttpUpstreamClient, RequestOptions, UpstreamClient, UpstreamResponse};

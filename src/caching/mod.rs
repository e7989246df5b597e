//! # Caching
//!
//! Lookup-side caching for pickup-point searches:
//! 1. **Key generator**: canonical cache keys and rate-limit client keys
//! 2. **Store**: TTL cache with content fingerprints
//! 3. **Coalescer**: one in-flight upstream call per key

pub mod coalescer;
pub mod key_generator;
pub mod store;

pub use coalescer::{CoalescerStats, RequestCoalescer};
pub use key_generator::{CacheKey, NormalizedQuery, QueryNormalizer};
pub use store::{CacheEntry, CacheStats, CacheStore};

//! # TTL Cache Store
//!
//! In-memory map from cache key to resolved pickup points, a content
//! fingerprint and an absolute expiry instant.
//!
//! Freshness is purely time based: an entry is fresh while `now < expires_at`.
//! Expired entries are ignored by [`CacheStore::get`] but stay readable through
//! [`CacheStore::get_stale`] until they are overwritten, swept, or evicted to
//! make room.

use crate::core::clock::Clock;
use crate::core::types::PickupPoint;
use crate::observability::metrics::CACHE_ENTRIES;
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

/// One cached lookup result
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub points: Vec<PickupPoint>,
    pub fingerprint: String,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Time left before expiry; zero once stale
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Stable content hash over the serialized points
pub fn fingerprint(points: &[PickupPoint]) -> String {
    let bytes = serde_json::to_vec(points).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale_reads: u64,
    pub writes: u64,
    pub evictions: u64,
    pub expired_removed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_reads: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
    expired_removed: AtomicU64,
}

pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    /// 0 means unbounded
    max_entries: usize,
    counters: Counters,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            counters: Counters::default(),
            clock,
        }
    }

    /// Fresh entry for `key`, if any. Never touches upstream.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        let hit = self
            .entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value().clone());

        if hit.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Entry for `key` regardless of freshness
    pub fn get_stale(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.get(key).map(|entry| entry.value().clone());
        if entry.is_some() {
            self.counters.stale_reads.fetch_add(1, Ordering::Relaxed);
        }
        entry
    }

    /// Store `points` under `key` for `ttl`, replacing any previous entry
    pub fn put(&self, key: &str, points: Vec<PickupPoint>, ttl: Duration) -> CacheEntry {
        let entry = CacheEntry {
            key: key.to_string(),
            fingerprint: fingerprint(&points),
            points,
            expires_at: self.clock.now() + ttl,
        };

        self.entries.insert(key.to_string(), entry.clone());
        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        // Trimmed after the insert so concurrent writers of new keys cannot
        // leave the store above capacity once every `put` has returned.
        if self.max_entries > 0 {
            while self.entries.len() > self.max_entries {
                if !self.evict_earliest_expiry(key) {
                    break;
                }
            }
        }
        metrics::gauge!(CACHE_ENTRIES).set(self.entries.len() as f64);
        entry
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    pub fn clear(&self) {
        self.entries.clear();
        metrics::gauge!(CACHE_ENTRIES).set(0.0);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Physically drop every expired entry
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.counters
                .expired_removed
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "Swept expired cache entries");
        }
        metrics::gauge!(CACHE_ENTRIES).set(self.entries.len() as f64);
        removed
    }

    /// Run [`CacheStore::sweep_expired`] every `every` on a background task
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            max_entries: self.max_entries,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stale_reads: self.counters.stale_reads.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expired_removed: self.counters.expired_removed.load(Ordering::Relaxed),
        }
    }

    /// Evict the entry closest to expiry, never `keep`
    fn evict_earliest_expiry(&self, keep: &str) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|entry| entry.key() != keep)
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());

        match victim {
            Some(key) => {
                if self.entries.remove(&key).is_some() {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                }
                debug!(key = %key, "Evicted cache entry to stay within capacity");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use serde_json::json;

    fn point(id: &str) -> PickupPoint {
        PickupPoint {
            id: id.to_string(),
            provider: "inpost".to_string(),
            name: format!("Paczkomat {id}"),
            address: "ul. Marszałkowska 1".to_string(),
            city: "Warszawa".to_string(),
            postal_code: "00-001".to_string(),
            country: "PL".to_string(),
            distance: None,
            hours: Some("24/7".to_string()),
            coordinates: None,
            raw_payload: json!({ "code": id }),
        }
    }

    fn store(max_entries: usize) -> (CacheStore, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        (CacheStore::new(max_entries, clock.clone()), clock)
    }

    #[test]
    fn test_fresh_until_expiry() {
        let (store, clock) = store(0);
        store.put("k", vec![point("WAW01")], Duration::from_millis(1_000));

        clock.advance(Duration::from_millis(999));
        let entry = store.get("k").expect("entry should still be fresh");
        assert_eq!(entry.remaining(clock.now()), Duration::from_millis(1));

        clock.advance(Duration::from_millis(1));
        assert!(store.get("k").is_none());
        assert!(store.get_stale("k").is_some());
    }

    #[test]
    fn test_put_overwrites_and_refingerprints() {
        let (store, _) = store(0);
        let first = store.put("k", vec![point("A")], Duration::from_secs(60));
        let second = store.put("k", vec![point("B")], Duration::from_secs(60));

        assert_ne!(first.fingerprint, second.fingerprint);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k").unwrap().points[0].id, "B");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let points = vec![point("A"), point("B")];
        assert_eq!(fingerprint(&points), fingerprint(&points.clone()));
        assert_eq!(fingerprint(&points).len(), 64);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (store, clock) = store(0);
        store.put("short", vec![point("A")], Duration::from_millis(100));
        store.put("long", vec![point("B")], Duration::from_millis(10_000));

        clock.advance(Duration::from_millis(500));
        assert_eq!(store.sweep_expired(), 1);
        assert!(store.get_stale("short").is_none());
        assert!(store.get("long").is_some());
        assert_eq!(store.stats().expired_removed, 1);
    }

    #[test]
    fn test_capacity_evicts_earliest_expiry() {
        let (store, _) = store(2);
        store.put("a", vec![point("A")], Duration::from_secs(30));
        store.put("b", vec![point("B")], Duration::from_secs(10));
        // Overwriting an existing key never evicts
        store.put("a", vec![point("A2")], Duration::from_secs(30));
        assert_eq!(store.stats().evictions, 0);

        store.put("c", vec![point("C")], Duration::from_secs(60));
        assert_eq!(store.len(), 2);
        assert!(store.get_stale("b").is_none());
        assert!(store.get("a").is_some());
        assert!(store.get("c").is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_concurrent_new_keys_respect_capacity() {
        let store = Arc::new(CacheStore::new(4, ManualClock::shared()));

        std::thread::scope(|scope| {
            for writer in 0..8 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for i in 0..50 {
                        let key = format!("pickup:city=w{writer}-{i}");
                        store.put(&key, vec![point("A")], Duration::from_secs(60 + i));
                    }
                });
            }
        });

        assert!(store.len() <= 4, "store grew to {}", store.len());
        assert_eq!(store.stats().writes, 400);
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let (store, _) = store(0);
        store.get("missing");
        store.put("k", vec![point("A")], Duration::from_secs(1));
        store.get("k");
        store.get("k");

        let stats = store.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_runs_on_interval() {
        let clock = ManualClock::shared();
        let store = Arc::new(CacheStore::new(0, clock.clone()));
        store.put("k", vec![point("A")], Duration::from_millis(10));
        clock.advance(Duration::from_millis(20));

        let handle = store.spawn_sweeper(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        assert!(store.is_empty());
        handle.abort();
    }
}

//! # Request Coalescer
//!
//! Keeps at most one in-flight upstream call per cache key. The first caller
//! for a key starts the work on a tokio task and registers a shared handle to
//! it; later callers for the same key attach to that handle and observe the
//! identical outcome, success or failure.
//!
//! The registry entry is removed by the task itself once the work settles,
//! before any caller sees the result, so the next lookup after settlement
//! always starts fresh work. Running the work on its own task means a caller
//! that goes away does not stall everyone else attached to the key.

use crate::core::error::UpstreamError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

type PendingCall<V> = Shared<BoxFuture<'static, Result<V, UpstreamError>>>;

#[derive(Debug, Clone, Serialize)]
pub struct CoalescerStats {
    pub in_flight: usize,
    pub started: u64,
    pub joined: u64,
}

pub struct RequestCoalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    pending: Arc<Mutex<HashMap<String, PendingCall<V>>>>,
    started: AtomicU64,
    joined: AtomicU64,
}

impl<V> Default for RequestCoalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RequestCoalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            started: AtomicU64::new(0),
            joined: AtomicU64::new(0),
        }
    }

    /// Attach to the in-flight call for `key`, or start `work` as that call.
    ///
    /// `work` is only polled when this caller becomes the leader; otherwise it
    /// is dropped unstarted.
    pub async fn join_or_start<F>(&self, key: &str, work: F) -> Result<V, UpstreamError>
    where
        F: Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        let call = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(existing) => {
                    self.joined.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Joining in-flight upstream call");
                    existing.clone()
                }
                None => {
                    let call = self.start(key.to_string(), work);
                    pending.insert(key.to_string(), call.clone());
                    self.started.fetch_add(1, Ordering::Relaxed);
                    call
                }
            }
        };

        call.await
    }

    /// Number of keys with an upstream call currently in flight
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            in_flight: self.in_flight(),
            started: self.started.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
        }
    }

    fn start<F>(&self, key: String, work: F) -> PendingCall<V>
    where
        F: Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        let deregister = Deregister {
            registry: Arc::clone(&self.pending),
            key: key.clone(),
        };

        // Registry lock is held by the caller while spawning; the task can only
        // remove its entry after that insert has been made. The guard also
        // runs when `work` panics or the task is aborted.
        let handle = tokio::spawn(async move {
            let _deregister = deregister;
            work.await
        });

        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!(key = %key, error = %join_error, "Coalesced upstream task did not complete");
                    Err(UpstreamError::Network(format!(
                        "upstream task aborted: {join_error}"
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Removes a key from the pending registry when the owning task ends
struct Deregister<V>
where
    V: Clone + Send + Sync + 'static,
{
    registry: Arc<Mutex<HashMap<String, PendingCall<V>>>>,
    key: String,
}

impl<V> Drop for Deregister<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.registry.lock().remove(&self.key);
    }
}

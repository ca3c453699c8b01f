//! In-flight request tracking for supersession.
//!
//! At most one tracked request per key. Registering a new request under a
//! key that is still in flight cancels the older one; the older request then
//! settles as canceled (`Ok(None)`) instead of producing a response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics;
use crate::models::PendingRequest;

#[derive(Debug)]
struct Entry {
    id: u64,
    token: CancellationToken,
}

/// Map from request key (the request path) to its cancellation token.
#[derive(Debug, Default)]
pub struct InFlightRequestTracker {
    entries: Mutex<HashMap<String, Entry>>,
    next_id: AtomicU64,
}

impl InFlightRequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new request under `key`, canceling whatever was there.
    pub async fn register(&self, key: &str) -> PendingRequest {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                id,
                token: token.clone(),
            },
        );

        if let Some(previous) = previous {
            previous.token.cancel();
            metrics::record_superseded();
            debug!(key, superseded = previous.id, by = id, "Canceled older in-flight request");
        }

        PendingRequest {
            key: key.to_string(),
            id,
            token,
        }
    }

    /// Drop the entry for `pending`, unless a newer request already owns the key.
    pub async fn release(&self, pending: &PendingRequest) {
        let mut entries = self.entries.lock().await;
        if entries.get(&pending.key).is_some_and(|e| e.id == pending.id) {
            entries.remove(&pending.key);
        }
    }

    pub async fn is_tracked(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

//! Coalesced queue persistence
//!
//! Both queues share one persisted snapshot. Writes are coalesced rather
//! than issued on every mutation: a flush happens at most once per
//! configured interval, except on significant transitions (entering or
//! leaving `Offline`) which force one. A single in-flight flag keeps
//! overlapping flushes from interleaving and corrupting the blob. Store
//! failures degrade the session to in-memory-only operation.

use crate::{QueueSnapshot, SnapshotStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Persisted form of both queues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    /// Pending notifications, oldest first
    pub notifications: QueueSnapshot<Value>,
    /// Offline actions awaiting replay, oldest first
    pub offline_actions: QueueSnapshot<Value>,
}

/// Coalescing writer around a `SnapshotStore`
pub struct SnapshotWriter {
    store: Arc<dyn SnapshotStore>,
    min_interval: Duration,
    last_flush: Mutex<Option<Instant>>,
    in_flight: AtomicBool,
    /// Set after a store failure; all later writes are skipped
    degraded: AtomicBool,
}

impl SnapshotWriter {
    /// Create a writer with the given coalescing interval
    pub fn new(store: Arc<dyn SnapshotStore>, min_interval: Duration) -> Self {
        Self {
            store,
            min_interval,
            last_flush: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether persistence has degraded to in-memory-only operation
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Flush the snapshot if coalescing allows it
    ///
    /// `force` bypasses the minimum interval (used on significant state
    /// transitions). A flush already in flight, a degraded store, or a
    /// too-recent previous flush all skip silently.
    pub async fn flush(&self, state: &PersistedState, force: bool) {
        if self.degraded.load(Ordering::SeqCst) {
            return;
        }

        if !force && !self.interval_elapsed() {
            return;
        }

        // Single in-flight flush; a concurrent caller backs off and the
        // next mutation will flush again
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("Snapshot flush already in flight, skipping");
            return;
        }

        let result = match serde_json::to_string(state) {
            Ok(blob) => self.store.save(&blob).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                let mut last = self.last_flush.lock().unwrap_or_else(|e| e.into_inner());
                *last = Some(Instant::now());
                debug!(
                    "Persisted snapshot ({} notifications, {} offline actions)",
                    state.notifications.items.len(),
                    state.offline_actions.items.len()
                );
            }
            Err(e) => {
                warn!(
                    "Snapshot save failed, continuing in-memory only: {}",
                    e
                );
                self.degraded.store(true, Ordering::SeqCst);
            }
        }

        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Load the persisted snapshot, if any
    ///
    /// A missing blob means a fresh start. A corrupt blob or a failing
    /// store is logged and treated the same way; it never aborts startup.
    pub async fn load(&self) -> Option<PersistedState> {
        let blob = match self.store.load().await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!("No snapshot found, starting fresh");
                return None;
            }
            Err(e) => {
                warn!("Snapshot load failed, starting fresh: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<PersistedState>(&blob) {
            Ok(state) => {
                info!(
                    "Restored snapshot ({} notifications, {} offline actions)",
                    state.notifications.items.len(),
                    state.offline_actions.items.len()
                );
                Some(state)
            }
            Err(e) => {
                warn!("Snapshot blob is corrupt, starting fresh: {}", e);
                None
            }
        }
    }

    fn interval_elapsed(&self) -> bool {
        let last = self.last_flush.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(at) => at.elapsed() >= self.min_interval,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ResilienceError, Result};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct MemoryStore {
        blob: Mutex<Option<String>>,
        saves: AtomicUsize,
        fail_saves: bool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                blob: Mutex::new(None),
                saves: AtomicUsize::new(0),
                fail_saves: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_saves: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn save(&self, blob: &str) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.fail_saves {
                return Err(ResilienceError::Persistence("disk full".to_string()));
            }
            *self.blob.lock().unwrap() = Some(blob.to_string());
            Ok(())
        }

        async fn load(&self) -> Result<Option<String>> {
            Ok(self.blob.lock().unwrap().clone())
        }
    }

    fn empty_state() -> PersistedState {
        PersistedState {
            notifications: QueueSnapshot { items: Vec::new() },
            offline_actions: QueueSnapshot { items: Vec::new() },
        }
    }

    #[tokio::test]
    async fn test_flush_and_load_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let writer = SnapshotWriter::new(store.clone(), Duration::from_secs(10));

        writer.flush(&empty_state(), true).await;
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);

        let restored = writer.load().await;
        assert!(restored.is_some());
    }

    #[tokio::test]
    async fn test_writes_are_coalesced() {
        let store = Arc::new(MemoryStore::new());
        let writer = SnapshotWriter::new(store.clone(), Duration::from_secs(600));

        writer.flush(&empty_state(), true).await;
        // Within the interval, non-forced flushes are skipped
        writer.flush(&empty_state(), false).await;
        writer.flush(&empty_state(), false).await;
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);

        // Forced flush bypasses the interval
        writer.flush(&empty_state(), true).await;
        assert_eq!(store.saves.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_memory_only() {
        let store = Arc::new(MemoryStore::failing());
        let writer = SnapshotWriter::new(store.clone(), Duration::from_secs(10));

        writer.flush(&empty_state(), true).await;
        assert!(writer.is_degraded());

        // Later flushes never touch the store again this session
        writer.flush(&empty_state(), true).await;
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_corrupt_blob_starts_fresh() {
        let store = Arc::new(MemoryStore::new());
        *store.blob.lock().unwrap() = Some("not json".to_string());

        let writer = SnapshotWriter::new(store, Duration::from_secs(10));
        assert!(writer.load().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_blob_starts_fresh() {
        let store = Arc::new(MemoryStore::new());
        let writer = SnapshotWriter::new(store, Duration::from_secs(10));
        assert!(writer.load().await.is_none());
    }
}

//! Bounded FIFO queue with eviction and retry accounting
//!
//! Used twice by the monitor: once for outbound notifications awaiting
//! presentation, once for offline user actions awaiting replay. Overflow
//! evicts the oldest item; a drain pass delivers strictly in FIFO order and
//! drops an item permanently once its retry budget is exhausted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome reported by a delivery callback for a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Item was delivered/acknowledged; remove it from the queue
    Delivered,
    /// Delivery failed; retry on a later pass if budget remains
    Failed,
}

/// Result of a drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items delivered and removed
    pub delivered: usize,
    /// Items permanently dropped after exhausting their retry budget
    pub dropped: usize,
    /// Items still pending (head failed with budget remaining)
    pub retained: usize,
}

/// A queued payload with retry accounting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem<T> {
    /// Stable item id
    pub id: Uuid,
    /// Enqueue timestamp (UNIX millis)
    pub enqueued_at: i64,
    /// The payload to deliver
    pub payload: T,
    /// Failed delivery attempts so far
    pub delivery_attempts: u32,
}

impl<T> QueueItem<T> {
    fn new(payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            enqueued_at: chrono::Utc::now().timestamp_millis(),
            payload,
            delivery_attempts: 0,
        }
    }
}

/// Serialized form of a queue, used for persistence across reloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot<T> {
    /// Items in FIFO order (oldest first)
    pub items: Vec<QueueItem<T>>,
}

/// Ordered, capacity-limited holding area
///
/// Invariants: `len() <= capacity()` at all times; insertion at capacity
/// evicts the oldest item, never a newer one; an item whose attempts exceed
/// the retry budget is removed and never re-enqueued.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    /// Human-readable queue name, used in log output only
    name: &'static str,
    items: VecDeque<QueueItem<T>>,
    capacity: usize,
    /// Total items evicted by overflow since construction
    evicted: u64,
}

impl<T> BoundedQueue<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Create an empty queue with the given capacity
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    /// Number of items currently queued
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total overflow evictions since construction
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Append a payload, evicting the oldest item first if at capacity
    ///
    /// Overflow is an expected operating condition on a disconnected client,
    /// not an error; it is logged and counted.
    pub fn enqueue(&mut self, payload: T) -> Uuid {
        if self.items.len() >= self.capacity {
            if let Some(oldest) = self.items.pop_front() {
                self.evicted += 1;
                warn!(
                    "{} queue at capacity ({}), evicting oldest item {}",
                    self.name, self.capacity, oldest.id
                );
            }
        }

        let item = QueueItem::new(payload);
        let id = item.id;
        self.items.push_back(item);
        debug!("{} queue: enqueued {} ({} queued)", self.name, id, self.items.len());
        id
    }

    /// Deliver queued items in FIFO order
    ///
    /// Calls `deliver` for each item starting at the head. A delivered item
    /// is removed. A failed item has its attempt count incremented; if the
    /// count exceeds `max_retries` the item is dropped permanently and the
    /// pass continues, otherwise the item stays at the head and the pass
    /// stops — a newer item is never delivered ahead of an older one still
    /// pending.
    pub async fn drain<F, Fut>(&mut self, max_retries: u32, mut deliver: F) -> DrainReport
    where
        F: FnMut(QueueItem<T>) -> Fut,
        Fut: Future<Output = DeliveryStatus>,
    {
        let mut report = DrainReport::default();

        loop {
            let Some(attempt) = self.items.front().cloned() else {
                break;
            };
            match deliver(attempt).await {
                DeliveryStatus::Delivered => {
                    if let Some(item) = self.items.pop_front() {
                        debug!("{} queue: delivered {}", self.name, item.id);
                        report.delivered += 1;
                    }
                }
                DeliveryStatus::Failed => {
                    let exhausted = match self.items.front_mut() {
                        Some(head) => {
                            head.delivery_attempts += 1;
                            head.delivery_attempts > max_retries
                        }
                        None => break,
                    };
                    if exhausted {
                        if let Some(item) = self.items.pop_front() {
                            warn!(
                                "{} queue: dropping {} after {} failed attempts",
                                self.name, item.id, item.delivery_attempts
                            );
                            report.dropped += 1;
                        }
                    } else {
                        // Head keeps its place; a newer item must not be
                        // delivered ahead of it
                        report.retained = self.items.len();
                        break;
                    }
                }
            }
        }

        report
    }

    /// Change capacity; shrinking trims from the oldest end
    pub fn resize(&mut self, new_capacity: usize) {
        self.capacity = new_capacity.max(1);
        while self.items.len() > self.capacity {
            if let Some(oldest) = self.items.pop_front() {
                self.evicted += 1;
                debug!(
                    "{} queue: trimmed {} while shrinking to {}",
                    self.name, oldest.id, self.capacity
                );
            }
        }
    }

    /// Remove all items
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Serialize the queue contents for persistence
    pub fn snapshot(&self) -> QueueSnapshot<T> {
        QueueSnapshot {
            items: self.items.iter().cloned().collect(),
        }
    }

    /// Replace the queue contents from a snapshot, trimming oldest-first if
    /// the snapshot exceeds the current capacity
    pub fn restore(&mut self, snapshot: QueueSnapshot<T>) {
        self.items = snapshot.items.into();
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
        debug!("{} queue: restored {} items", self.name, self.items.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queue(capacity: usize) -> BoundedQueue<Value> {
        BoundedQueue::new("test", capacity)
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut q = queue(50);
        for i in 0..60 {
            q.enqueue(json!({ "seq": i }));
            assert!(q.len() <= 50);
        }
        assert_eq!(q.len(), 50);
        assert_eq!(q.evicted(), 10);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut q = queue(50);
        for i in 0..60 {
            q.enqueue(json!({ "seq": i }));
        }
        // The 10 oldest (0..10) were evicted; head is seq 10
        let snapshot = q.snapshot();
        assert_eq!(snapshot.items[0].payload["seq"], 10);
        assert_eq!(snapshot.items[49].payload["seq"], 59);
    }

    #[test]
    fn test_resize_trims_from_oldest_end() {
        let mut q = queue(10);
        for i in 0..10 {
            q.enqueue(json!({ "seq": i }));
        }
        q.resize(5);
        assert_eq!(q.len(), 5);
        assert_eq!(q.capacity(), 5);
        assert_eq!(q.snapshot().items[0].payload["seq"], 5);
    }

    #[tokio::test]
    async fn test_drain_delivers_in_fifo_order() {
        let mut q = queue(10);
        for i in 0..5 {
            q.enqueue(json!({ "seq": i }));
        }

        let mut seen = Vec::new();
        let report = q
            .drain(3, |item| {
                seen.push(item.payload["seq"].as_i64().unwrap());
                async { DeliveryStatus::Delivered }
            })
            .await;

        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(report.delivered, 5);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_drain_stops_at_retained_head() {
        let mut q = queue(10);
        q.enqueue(json!({ "seq": 0 }));
        q.enqueue(json!({ "seq": 1 }));

        let attempts = AtomicUsize::new(0);
        let report = q
            .drain(3, |_item| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { DeliveryStatus::Failed }
            })
            .await;

        // Head failed with retries remaining; the newer item was not touched
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(report.retained, 2);
        assert_eq!(report.delivered, 0);
        assert_eq!(q.len(), 2);
        assert_eq!(q.snapshot().items[0].delivery_attempts, 1);
    }

    #[tokio::test]
    async fn test_drain_drops_item_after_retry_exhaustion() {
        let mut q = queue(10);
        q.enqueue(json!({ "poisoned": true }));
        q.enqueue(json!({ "seq": 1 }));

        // max_retries = 2: attempts 1 and 2 retain, attempt 3 drops
        for _ in 0..2 {
            let report = q.drain(2, |_| async { DeliveryStatus::Failed }).await;
            assert_eq!(report.dropped, 0);
            assert_eq!(q.len(), 2);
        }

        let mut delivered = Vec::new();
        let report = q
            .drain(2, |item| {
                let poisoned = item.payload.get("poisoned").is_some();
                delivered.push(item.payload.clone());
                async move {
                    if poisoned {
                        DeliveryStatus::Failed
                    } else {
                        DeliveryStatus::Delivered
                    }
                }
            })
            .await;

        // Poisoned head dropped permanently, rest of the queue processed
        assert_eq!(report.dropped, 1);
        assert_eq!(report.delivered, 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut q = queue(10);
        for i in 0..3 {
            q.enqueue(json!({ "seq": i }));
        }

        let blob = serde_json::to_string(&q.snapshot()).unwrap();
        let parsed: QueueSnapshot<Value> = serde_json::from_str(&blob).unwrap();

        let mut restored = queue(10);
        restored.restore(parsed);
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.snapshot().items[0].payload["seq"], 0);
    }

    #[test]
    fn test_restore_respects_capacity() {
        let mut q = queue(10);
        for i in 0..8 {
            q.enqueue(json!({ "seq": i }));
        }
        let snapshot = q.snapshot();

        let mut small = queue(4);
        small.restore(snapshot);
        assert_eq!(small.len(), 4);
        // Oldest trimmed first
        assert_eq!(small.snapshot().items[0].payload["seq"], 4);
    }
}

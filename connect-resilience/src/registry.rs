//! State-change listener registry
//!
//! Fan-out of state-change events to subscribers. Handlers are stored in an
//! arena with stable ids so removal during iteration cannot invalidate an
//! in-progress notification, and a failing handler never prevents the
//! remaining handlers from running.

use crate::{Result, StateChange};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Stable handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// State-change handler contract
///
/// Handlers report failure through `Result` rather than panicking; an `Err`
/// is logged and isolated.
pub type StateListener = Arc<dyn Fn(&StateChange) -> Result<()> + Send + Sync>;

struct RegistryInner {
    next_id: u64,
    /// Entries in registration order
    entries: Vec<(SubscriptionId, StateListener)>,
}

/// Registry of state-change subscribers
pub struct ListenerRegistry {
    inner: Mutex<RegistryInner>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id: 1,
                entries: Vec::new(),
            }),
        }
    }

    /// Register a handler; handlers are notified in registration order
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChange) -> Result<()> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push((id, Arc::new(handler)));
        debug!("Registered state listener {:?}", id);
        id
    }

    /// Remove a handler; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = inner.entries.len();
        inner.entries.retain(|(entry_id, _)| *entry_id != id);
        before != inner.entries.len()
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    /// Check if no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all handlers
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
    }

    /// Invoke every registered handler in registration order
    ///
    /// The handler list is snapshotted before invocation: a handler added
    /// during a notify cycle is not called in that cycle, and unsubscribing
    /// mid-cycle cannot invalidate the iteration. A handler returning `Err`
    /// is logged and does not stop the remaining handlers.
    pub fn notify(&self, change: &StateChange) {
        let handlers: Vec<(SubscriptionId, StateListener)> = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.entries.clone()
        };

        for (id, handler) in handlers {
            if let Err(e) = handler(change) {
                warn!("State listener {:?} failed: {}", id, e);
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionQuality, ConnectionState, ResilienceError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn change() -> StateChange {
        StateChange {
            state: ConnectionState::Connected,
            quality: ConnectionQuality::Good,
        }
    }

    #[test]
    fn test_notify_in_registration_order() {
        let registry = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            registry.subscribe(move |_| {
                order.lock().unwrap().push(i);
                Ok(())
            });
        }

        registry.notify(&change());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_handler_does_not_block_others() {
        let registry = ListenerRegistry::new();
        let called = Arc::new(AtomicUsize::new(0));

        registry.subscribe(|_| Err(ResilienceError::Listener("boom".to_string())));
        let called_clone = Arc::clone(&called);
        registry.subscribe(move |_| {
            called_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        registry.notify(&change());
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = ListenerRegistry::new();
        let called = Arc::new(AtomicUsize::new(0));

        let called_clone = Arc::clone(&called);
        let id = registry.subscribe(move |_| {
            called_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));

        registry.notify(&change());
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_subscribe_during_notify_waits_for_next_cycle() {
        let registry = Arc::new(ListenerRegistry::new());
        let called = Arc::new(AtomicUsize::new(0));

        // The handler registers a new handler mid-cycle; the snapshot taken
        // at notify time does not include it until the next cycle
        let registry_clone = Arc::clone(&registry);
        let called_clone = Arc::clone(&called);
        registry.subscribe(move |_| {
            let called = Arc::clone(&called_clone);
            registry_clone.subscribe(move |_| {
                called.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        registry.notify(&change());
        assert_eq!(called.load(Ordering::SeqCst), 0);

        registry.notify(&change());
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_during_notify_is_safe() {
        let registry = Arc::new(ListenerRegistry::new());
        let called = Arc::new(AtomicUsize::new(0));

        // First handler unsubscribes the second mid-cycle; the snapshot
        // taken at notify time still runs it for this cycle
        let second_id = Arc::new(Mutex::new(None));

        let registry_clone = Arc::clone(&registry);
        let second_id_clone = Arc::clone(&second_id);
        registry.subscribe(move |_| {
            if let Some(id) = *second_id_clone.lock().unwrap() {
                registry_clone.unsubscribe(id);
            }
            Ok(())
        });

        let called_clone = Arc::clone(&called);
        let id = registry.subscribe(move |_| {
            called_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        *second_id.lock().unwrap() = Some(id);

        registry.notify(&change());
        assert_eq!(called.load(Ordering::SeqCst), 1);

        // Second cycle: the handler is gone
        registry.notify(&change());
        assert_eq!(called.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }
}

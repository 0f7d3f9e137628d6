//! Collaborator interfaces
//!
//! The resilience core does not open sockets, render notifications, or talk
//! to storage itself. Every external effect goes through one of these
//! injected traits, which keeps the state machine deterministic under test
//! and the host platform free to wire in whatever transport it has.

use crate::{BatteryInfo, DeliveryStatus, DeviceProfile, QueueItem, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Result of a liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The backend answered within the timeout
    Success {
        /// Round-trip latency of the probe
        latency: Duration,
    },
    /// The probe errored or the backend was unreachable
    ///
    /// A probe that times out is reported the same way.
    Failure,
}

/// Liveness round-trip to the backend
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Perform one probe, bounded by `timeout`
    async fn check(&self, timeout: Duration) -> ProbeOutcome;
}

/// Device capability and battery sampling
pub trait CapabilityProvider: Send + Sync {
    /// Device capability profile; sampled once at monitor startup
    fn device_profile(&self) -> DeviceProfile;

    /// Current battery sample, or `None` when the platform does not expose
    /// battery state
    fn sample_battery(&self) -> Option<BatteryInfo>;
}

/// Host notification subsystem consumed by the notification queue drain
#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    /// Present one notification to the user
    async fn present(&self, item: &QueueItem<Value>) -> DeliveryStatus;
}

/// Backend sync endpoint consumed by the offline-action queue drain
///
/// Actions are replayed strictly in enqueue order; an item is removed from
/// the queue only after this returns `Delivered`.
#[async_trait]
pub trait BackendSync: Send + Sync {
    /// Replay one offline action to the backend
    async fn replay(&self, item: &QueueItem<Value>) -> DeliveryStatus;
}

/// Key/value persistence for queue snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist the snapshot blob
    async fn save(&self, blob: &str) -> Result<()>;

    /// Load the last persisted blob, or `None` if nothing was saved
    async fn load(&self) -> Result<Option<String>>;
}

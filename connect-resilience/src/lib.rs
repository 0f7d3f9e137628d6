//! Connection Resilience & Adaptive Notification Delivery
//!
//! Client-side resilience core for a mobile web client on unreliable,
//! low-bandwidth networks and resource-constrained devices. Provides the
//! connectivity state machine, exponential backoff with jitter, bounded
//! queues with drop-oldest eviction, battery/device-adaptive tuning, and
//! offline-to-online replay of captured user actions.
//!
//! The core performs no I/O of its own: probing, notification presentation,
//! backend replay, capability sampling, and persistence are all injected
//! collaborator traits (see [`providers`]).

pub mod backoff;
pub mod config;
pub mod monitor;
pub mod power;
pub mod providers;
pub mod queue;
pub mod registry;
pub mod snapshot;
pub mod types;

mod error;

pub use backoff::BackoffController;
pub use config::MonitorConfig;
pub use error::{ResilienceError, Result};
pub use monitor::{ConnectionMonitor, Visibility};
pub use power::PowerAdaptationPolicy;
pub use providers::{
    BackendSync, CapabilityProvider, HealthProbe, NotificationPresenter, ProbeOutcome,
    SnapshotStore,
};
pub use queue::{BoundedQueue, DeliveryStatus, DrainReport, QueueItem, QueueSnapshot};
pub use registry::{ListenerRegistry, StateListener, SubscriptionId};
pub use snapshot::{PersistedState, SnapshotWriter};
pub use types::{
    BatteryInfo, ConnectionQuality, ConnectionState, ConnectionStatus, DeviceProfile, DeviceTier,
    StateChange, TuningParameters,
};

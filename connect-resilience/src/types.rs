//! Shared data model for the resilience core
//!
//! Connection state and quality, device capability classification, battery
//! samples, and the tuning parameters derived from them. All types are
//! serializable so queue snapshots and status reads can cross a persistence
//! or IPC boundary unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Probe latency below which the connection is considered excellent
pub const EXCELLENT_LATENCY: Duration = Duration::from_millis(200);

/// Probe latency below which the connection is considered good
pub const GOOD_LATENCY: Duration = Duration::from_millis(500);

/// Connectivity state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connectivity established; probing may be scheduled
    Disconnected,
    /// A probe is in flight
    Probing,
    /// Last probe succeeded; heartbeat loop active
    Connected,
    /// Retries exhausted or platform reported offline; probing suspended
    /// until an external trigger
    Offline,
}

impl ConnectionState {
    /// Check if the backend is currently reachable
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if active probing is suspended
    pub fn is_suspended(&self) -> bool {
        matches!(self, ConnectionState::Offline)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Probing => write!(f, "probing"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Offline => write!(f, "offline"),
        }
    }
}

/// Connection quality derived from the most recent successful probe latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    /// Latency under 200ms
    Excellent,
    /// Latency under 500ms
    Good,
    /// Latency of 500ms or more
    Poor,
    /// No successful probe yet
    Unknown,
}

impl ConnectionQuality {
    /// Classify a successful probe's round-trip latency
    pub fn from_latency(latency: Duration) -> Self {
        if latency < EXCELLENT_LATENCY {
            ConnectionQuality::Excellent
        } else if latency < GOOD_LATENCY {
            ConnectionQuality::Good
        } else {
            ConnectionQuality::Poor
        }
    }
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionQuality::Excellent => write!(f, "excellent"),
            ConnectionQuality::Good => write!(f, "good"),
            ConnectionQuality::Poor => write!(f, "poor"),
            ConnectionQuality::Unknown => write!(f, "unknown"),
        }
    }
}

/// Coarse hardware capability classification driving default tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    /// Constrained hardware: smallest queues, longest intervals
    Basic,
    /// Typical hardware
    Standard,
    /// Capable hardware: largest queues, shortest intervals
    Advanced,
}

/// Device capability profile, sampled once at startup and immutable for the
/// session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Capability tier
    pub tier: DeviceTier,
    /// Whether the device is known to be low-end regardless of tier
    pub is_low_end: bool,
}

/// Battery sample from the capability provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryInfo {
    /// Battery percentage (0-100)
    pub level: u8,
    /// Whether the device is currently charging
    pub charging: bool,
}

/// Tuning parameters derived from the device profile and battery state
///
/// Recomputed whenever a new battery sample arrives; queue capacities and
/// backoff bounds follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningParameters {
    /// Interval between heartbeat probes while connected
    pub heartbeat_interval: Duration,
    /// Capacity of each bounded queue
    pub max_queue_size: usize,
    /// Retry budget for probes and per-item delivery
    pub max_retries: u32,
    /// Initial backoff delay
    pub base_backoff: Duration,
    /// Backoff delay cap
    pub max_backoff: Duration,
}

/// Snapshot of the monitor's externally visible state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Current state machine state
    pub state: ConnectionState,
    /// Quality derived from the last successful probe
    pub quality: ConnectionQuality,
    /// Device tier fixed at startup
    pub device_tier: DeviceTier,
    /// Most recent battery level, if the platform reports one
    pub battery_level: Option<u8>,
    /// Consecutive probe failures since the last success
    pub consecutive_failures: u32,
    /// Latency of the last successful probe, in milliseconds
    pub last_latency_ms: Option<u64>,
}

/// Event delivered to state-change listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    /// New state
    pub state: ConnectionState,
    /// Quality at the time of the change
    pub quality: ConnectionQuality,
}

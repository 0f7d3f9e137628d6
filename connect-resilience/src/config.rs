//! Monitor configuration
//!
//! Numeric defaults here are starting points, not validated production
//! values. Operators should tune them against real network conditions.

use crate::{ResilienceError, Result};
use std::time::Duration;

/// Floor for the heartbeat interval, regardless of tuning
///
/// Prevents resource exhaustion on constrained devices and networks: no
/// adaptation may probe more often than this.
pub const HEARTBEAT_FLOOR: Duration = Duration::from_secs(15);

/// Ceiling for the heartbeat interval
pub const HEARTBEAT_CEILING: Duration = Duration::from_secs(300);

/// Base probe timeout (first attempt)
pub const PROBE_TIMEOUT_BASE: Duration = Duration::from_secs(5);

/// Probe timeout cap; the timeout grows with consecutive failures but never
/// exceeds this
pub const PROBE_TIMEOUT_MAX: Duration = Duration::from_secs(30);

/// Maximum jitter added to backoff delays
pub const JITTER_MAX: Duration = Duration::from_secs(5);

/// Battery percentage below which power-save adaptation kicks in
pub const LOW_BATTERY_THRESHOLD: u8 = 30;

/// Queue capacity never shrinks below this
pub const MIN_QUEUE_CAPACITY: usize = 5;

/// Minimum interval between snapshot flushes (writes are coalesced)
pub const SNAPSHOT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for the connection monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Heartbeat interval floor
    pub heartbeat_floor: Duration,
    /// Heartbeat interval ceiling
    pub heartbeat_ceiling: Duration,
    /// Probe timeout for the first attempt
    pub probe_timeout_base: Duration,
    /// Probe timeout cap
    pub probe_timeout_max: Duration,
    /// Maximum backoff jitter
    pub jitter_max: Duration,
    /// Battery level below which power-save adaptation applies
    pub low_battery_threshold: u8,
    /// Minimum queue capacity after power-save halving
    pub min_queue_capacity: usize,
    /// Minimum interval between coalesced snapshot flushes
    pub snapshot_flush_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_floor: HEARTBEAT_FLOOR,
            heartbeat_ceiling: HEARTBEAT_CEILING,
            probe_timeout_base: PROBE_TIMEOUT_BASE,
            probe_timeout_max: PROBE_TIMEOUT_MAX,
            jitter_max: JITTER_MAX,
            low_battery_threshold: LOW_BATTERY_THRESHOLD,
            min_queue_capacity: MIN_QUEUE_CAPACITY,
            snapshot_flush_interval: SNAPSHOT_FLUSH_INTERVAL,
        }
    }
}

impl MonitorConfig {
    /// Validate the configuration
    ///
    /// Returns `ResilienceError::Configuration` for values that cannot make
    /// sense in any deployment. This is the only synchronous error surface
    /// of the public API.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_floor.is_zero() {
            return Err(ResilienceError::Configuration(
                "heartbeat floor must be positive".to_string(),
            ));
        }
        if self.heartbeat_ceiling < self.heartbeat_floor {
            return Err(ResilienceError::Configuration(format!(
                "heartbeat ceiling {:?} is below floor {:?}",
                self.heartbeat_ceiling, self.heartbeat_floor
            )));
        }
        if self.probe_timeout_base.is_zero() {
            return Err(ResilienceError::Configuration(
                "probe timeout must be positive".to_string(),
            ));
        }
        if self.probe_timeout_max < self.probe_timeout_base {
            return Err(ResilienceError::Configuration(format!(
                "probe timeout cap {:?} is below base {:?}",
                self.probe_timeout_max, self.probe_timeout_base
            )));
        }
        if self.min_queue_capacity == 0 {
            return Err(ResilienceError::Configuration(
                "minimum queue capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Probe timeout for a given consecutive-failure count
    ///
    /// Grows linearly with failures so repeated failures do not hold
    /// resources indefinitely, capped at `probe_timeout_max`.
    pub fn probe_timeout(&self, consecutive_failures: u32) -> Duration {
        let grown = self
            .probe_timeout_base
            .saturating_mul(consecutive_failures.saturating_add(1));
        grown.min(self.probe_timeout_max)
    }

    /// Clamp a heartbeat interval into the configured floor/ceiling band
    pub fn clamp_heartbeat(&self, interval: Duration) -> Duration {
        interval.clamp(self.heartbeat_floor, self.heartbeat_ceiling)
    }
}

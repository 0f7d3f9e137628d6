//! Power-save adaptation policy
//!
//! Pure mapping from `(DeviceProfile, BatteryInfo)` to `TuningParameters`.
//! Tier baselines set the defaults; a low, discharging battery doubles the
//! heartbeat interval and halves queue capacity until the battery recovers
//! or the device starts charging. Identical inputs always yield identical
//! outputs.

use crate::{BatteryInfo, DeviceProfile, DeviceTier, MonitorConfig, TuningParameters};
use std::time::Duration;

/// Baseline tuning for basic-tier devices
const BASIC_BASELINE: TuningParameters = TuningParameters {
    heartbeat_interval: Duration::from_secs(60),
    max_queue_size: 20,
    max_retries: 3,
    base_backoff: Duration::from_secs(2),
    max_backoff: Duration::from_secs(120),
};

/// Baseline tuning for standard-tier devices
const STANDARD_BASELINE: TuningParameters = TuningParameters {
    heartbeat_interval: Duration::from_secs(30),
    max_queue_size: 50,
    max_retries: 5,
    base_backoff: Duration::from_secs(1),
    max_backoff: Duration::from_secs(60),
};

/// Baseline tuning for advanced-tier devices
const ADVANCED_BASELINE: TuningParameters = TuningParameters {
    heartbeat_interval: Duration::from_secs(20),
    max_queue_size: 100,
    max_retries: 5,
    base_backoff: Duration::from_secs(1),
    max_backoff: Duration::from_secs(30),
};

/// Pure tuning-parameter policy
pub struct PowerAdaptationPolicy;

impl PowerAdaptationPolicy {
    /// Baseline parameters for a device profile
    ///
    /// A device flagged as low-end gets the basic baseline regardless of its
    /// reported tier. The heartbeat interval is clamped into the configured
    /// floor/ceiling band.
    pub fn baseline(profile: &DeviceProfile, config: &MonitorConfig) -> TuningParameters {
        let mut tuning = if profile.is_low_end {
            BASIC_BASELINE
        } else {
            match profile.tier {
                DeviceTier::Basic => BASIC_BASELINE,
                DeviceTier::Standard => STANDARD_BASELINE,
                DeviceTier::Advanced => ADVANCED_BASELINE,
            }
        };
        tuning.heartbeat_interval = config.clamp_heartbeat(tuning.heartbeat_interval);
        tuning
    }

    /// Compute tuning parameters for the current device and battery state
    ///
    /// With no battery sample (unsupported platform) the baseline applies
    /// unchanged. Below the low-battery threshold while discharging, the
    /// heartbeat interval doubles (still clamped) and queue capacity halves
    /// (floored at the configured minimum). Recovery above the threshold or
    /// charging restores the baseline.
    pub fn tune(
        profile: &DeviceProfile,
        battery: Option<&BatteryInfo>,
        config: &MonitorConfig,
    ) -> TuningParameters {
        let baseline = Self::baseline(profile, config);

        let Some(battery) = battery else {
            return baseline;
        };
        if battery.charging || battery.level >= config.low_battery_threshold {
            return baseline;
        }

        TuningParameters {
            heartbeat_interval: config.clamp_heartbeat(baseline.heartbeat_interval * 2),
            max_queue_size: (baseline.max_queue_size / 2).max(config.min_queue_capacity),
            ..baseline
        }
    }
}

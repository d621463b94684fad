//! Configuration structures for the acquisition worker.
//!
//! `DaqWorkerConfig` is a plain serde struct, TOML-friendly, with defaults
//! matching the framework's conventions (100 ms timer interval, a critical
//! not-alive count of 1, precise timer cadence). The interval is accepted in
//! human-readable form, e.g. `interval = "100ms"`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::daq::{TimerResolution, Trigger, TriggerKind};

/// Deserializable acquisition-worker settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaqWorkerConfig {
    /// Trigger mode of the worker.
    pub trigger: TriggerKind,
    /// Acquisition update interval; only used by the timer-driven mode.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Timer cadence class; only used by the timer-driven mode.
    pub timer_resolution: TimerResolution,
    /// Consecutive failed updates tolerated before the connection is declared
    /// lost. `0` means never give up.
    pub critical_not_alive_count: u32,
}

impl Default for DaqWorkerConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerKind::TimerDriven,
            interval: Duration::from_millis(100),
            timer_resolution: TimerResolution::Precise,
            critical_not_alive_count: 1,
        }
    }
}

impl DaqWorkerConfig {
    /// Builds the [`Trigger`] described by this configuration.
    pub fn to_trigger(&self) -> Trigger {
        match self.trigger {
            TriggerKind::TimerDriven => Trigger::TimerDriven {
                interval: self.interval,
                resolution: self.timer_resolution,
            },
            TriggerKind::SingleShotWake => Trigger::SingleShotWake,
            TriggerKind::ContinuousPausable => Trigger::ContinuousPausable,
        }
    }
}

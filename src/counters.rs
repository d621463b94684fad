//! Aggregate acquisition statistics.
//!
//! Counters are written by exactly one worker, inside the device lock's
//! critical section, and may be read from any thread without a lock. They are
//! plain atomics, so readers always see a coherent value — at worst one
//! update stale.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Lock-free counters shared between the workers and their callers.
///
/// `obtained_interval_ms` and `obtained_rate_hz` are `f64`s stored as raw
/// bits; both read as NaN until the acquisition worker has gathered enough
/// updates to compute them.
pub struct IoStats {
    update_counter_daq: AtomicU64,
    update_counter_jobs: AtomicU64,
    not_alive_counter_daq: AtomicU32,
    obtained_interval_ms: AtomicU64,
    obtained_rate_hz: AtomicU64,
}

impl IoStats {
    pub(crate) fn new() -> Self {
        Self {
            update_counter_daq: AtomicU64::new(0),
            update_counter_jobs: AtomicU64::new(0),
            not_alive_counter_daq: AtomicU32::new(0),
            obtained_interval_ms: AtomicU64::new(f64::NAN.to_bits()),
            obtained_rate_hz: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    /// Number of acquisition updates attempted so far.
    pub fn update_counter_daq(&self) -> u64 {
        self.update_counter_daq.load(Ordering::Relaxed)
    }

    /// Number of job-queue drains performed so far.
    pub fn update_counter_jobs(&self) -> u64 {
        self.update_counter_jobs.load(Ordering::Relaxed)
    }

    /// Consecutive failed acquisition attempts; reset on any success.
    pub fn not_alive_counter_daq(&self) -> u32 {
        self.not_alive_counter_daq.load(Ordering::Relaxed)
    }

    /// Measured time between the two most recent acquisition updates, in
    /// milliseconds. NaN until two updates have happened.
    pub fn obtained_interval_ms(&self) -> f64 {
        f64::from_bits(self.obtained_interval_ms.load(Ordering::Relaxed))
    }

    /// Measured acquisition rate in hertz, recomputed once per rate window.
    /// NaN until the first window has elapsed.
    pub fn obtained_rate_hz(&self) -> f64 {
        f64::from_bits(self.obtained_rate_hz.load(Ordering::Relaxed))
    }

    pub(crate) fn incr_update_counter_daq(&self) -> u64 {
        self.update_counter_daq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn incr_update_counter_jobs(&self) -> u64 {
        self.update_counter_jobs.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn incr_not_alive(&self) -> u32 {
        self.not_alive_counter_daq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn reset_not_alive(&self) {
        self.not_alive_counter_daq.store(0, Ordering::Relaxed);
    }

    pub(crate) fn set_obtained_interval_ms(&self, ms: f64) {
        self.obtained_interval_ms
            .store(ms.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_obtained_rate_hz(&self, hz: f64) {
        self.obtained_rate_hz.store(hz.to_bits(), Ordering::Relaxed);
    }
}

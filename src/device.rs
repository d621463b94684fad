//! The shared device handle.
//!
//! `DeviceHandle` wraps a user-supplied device behind the exclusive lock that
//! serializes all I/O between the acquisition worker and the job worker. It is
//! the only mutable resource both workers share; every other piece of state in
//! the crate is owned by exactly one worker.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

/// A user device behind an exclusive lock, plus a liveness flag and a display
/// name for diagnostics.
///
/// At most one worker holds the lock at a time. Both workers acquire it before
/// touching the device and release it before raising completion notifications,
/// so within one device all acquisition cycles and job drains are totally
/// ordered.
pub struct DeviceHandle<D> {
    name: String,
    alive: AtomicBool,
    inner: Mutex<D>,
}

impl<D> DeviceHandle<D> {
    /// Wraps `device`, assuming it is alive from the start.
    pub fn new(name: impl Into<String>, device: D) -> Self {
        Self::with_liveness(name, device, true)
    }

    /// Wraps `device` with an explicit initial liveness. Starting a worker on
    /// a handle born dead returns `false` instead of spawning a thread.
    pub fn with_liveness(name: impl Into<String>, device: D, alive: bool) -> Self {
        Self {
            name: name.into(),
            alive: AtomicBool::new(alive),
            inner: Mutex::new(device),
        }
    }

    /// Short display name of the device, used in log lines and thread names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the device is believed to be up and communicable.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Flips the liveness flag. The acquisition worker clears it when the
    /// critical not-alive threshold is breached.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    /// Acquires the exclusive device lock, blocking until it is free.
    pub fn lock(&self) -> MutexGuard<'_, D> {
        self.inner.lock()
    }
}

impl<D> std::fmt::Debug for DeviceHandle<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_flag_round_trips() {
        let handle = DeviceHandle::new("dev", 0u8);
        assert!(handle.is_alive());
        handle.set_alive(false);
        assert!(!handle.is_alive());
    }

    #[test]
    fn lock_serializes_access() {
        let handle = DeviceHandle::new("dev", vec![1, 2, 3]);
        handle.lock().push(4);
        assert_eq!(handle.lock().len(), 4);
    }
}

//! Start/stop handshake primitives.
//!
//! A [`Gate`] is a one-way latch: a worker opens it exactly once (on loop
//! entry or loop exit) and any number of threads can wait for it. Because the
//! open state is a flag checked under the same mutex the condvar waits on, a
//! waiter that arrives after the gate opened returns immediately — there is no
//! wake-before-wait window and no need for a safety-margin sleep.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// One-way latched condition used for the started and stopped handshakes.
#[derive(Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Opens the gate, releasing all current and future waiters. Idempotent.
    pub(crate) fn open(&self) {
        let mut open = self.open.lock();
        *open = true;
        self.cond.notify_all();
    }

    /// Whether the gate has been opened.
    pub(crate) fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Blocks until the gate opens. Returns immediately if it already has.
    pub(crate) fn wait_open(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }

    /// Blocks until the gate opens or `timeout` elapses. Returns whether the
    /// gate is open.
    pub(crate) fn wait_open_for(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut open = self.open.lock();
        while !*open {
            if self.cond.wait_until(&mut open, deadline).timed_out() {
                return *open;
            }
        }
        true
    }
}

//! Outward notifications.
//!
//! Workers raise zero-payload events; consumers read the orchestrator's
//! counters to get data. Each subscriber owns an unbounded channel receiver,
//! so emitting never blocks a worker thread. Receivers that have been dropped
//! are pruned on the next emit.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

/// Zero-payload notification raised by the workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DevIoEvent {
    /// The acquisition worker finished one update, successful or not.
    DaqUpdated,
    /// The continuous acquisition worker confirmed the paused state.
    DaqPaused,
    /// The critical not-alive threshold was breached; the device was marked
    /// dead and the acquisition worker stopped itself.
    ConnectionLost,
    /// The job worker finished draining the queue.
    JobsUpdated,
}

/// Fan-out hub for [`DevIoEvent`]s.
#[derive(Default)]
pub struct SignalHub {
    subscribers: Mutex<Vec<Sender<DevIoEvent>>>,
}

impl SignalHub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber. Every event emitted from now on is
    /// delivered to the returned receiver.
    pub fn subscribe(&self) -> Receiver<DevIoEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Delivers `event` to all live subscribers. Never blocks.
    pub(crate) fn emit(&self, event: DevIoEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_subscribers_receive_events() {
        let hub = SignalHub::new();
        let rx_a = hub.subscribe();
        let rx_b = hub.subscribe();

        hub.emit(DevIoEvent::DaqUpdated);
        hub.emit(DevIoEvent::JobsUpdated);

        assert_eq!(rx_a.try_iter().count(), 2);
        assert_eq!(rx_b.try_iter().count(), 2);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let hub = SignalHub::new();
        let rx = hub.subscribe();
        drop(hub.subscribe());

        hub.emit(DevIoEvent::DaqPaused);
        assert_eq!(hub.subscribers.lock().len(), 1);
        assert_eq!(rx.try_recv(), Ok(DevIoEvent::DaqPaused));
    }
}

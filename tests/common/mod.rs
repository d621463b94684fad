//! Shared helpers for the integration tests: a fake device and event tallies.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use devio::{DevIoEvent, DeviceHandle};

/// A scriptable stand-in for a real I/O device.
pub struct FakeDevice {
    /// Simulated device-side health; a dead device answers queries with
    /// failures (after a short delay, like a timed-out read would).
    pub alive: bool,
    pub count_commands: u32,
    pub count_replies: u32,
    /// Everything "written" to the device, in order.
    pub log: Vec<String>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            alive: true,
            count_commands: 0,
            count_replies: 0,
            log: Vec::new(),
        }
    }

    /// Simulated query; reports success while the device is alive.
    pub fn fake_query(&mut self) -> bool {
        self.count_commands += 1;
        if self.alive {
            self.count_replies += 1;
            true
        } else {
            std::thread::sleep(Duration::from_millis(10));
            false
        }
    }

    /// Simulated one-way write.
    pub fn write(&mut self, command: &str) {
        self.count_commands += 1;
        self.log.push(command.to_owned());
    }
}

pub fn fake_handle(alive: bool) -> Arc<DeviceHandle<FakeDevice>> {
    Arc::new(DeviceHandle::with_liveness("FakeDev", FakeDevice::new(), alive))
}

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub updated: usize,
    pub paused: usize,
    pub lost: usize,
    pub jobs: usize,
}

/// Drains and counts all events received so far.
pub fn tally(events: &Receiver<DevIoEvent>) -> EventCounts {
    let mut counts = EventCounts::default();
    for event in events.try_iter() {
        match event {
            DevIoEvent::DaqUpdated => counts.updated += 1,
            DevIoEvent::DaqPaused => counts.paused += 1,
            DevIoEvent::ConnectionLost => counts.lost += 1,
            DevIoEvent::JobsUpdated => counts.jobs += 1,
        }
    }
    counts
}

/// Blocks until `want` arrives or `timeout` elapses. Other events received in
/// the meantime are discarded.
pub fn wait_for(events: &Receiver<DevIoEvent>, want: DevIoEvent, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while let Ok(event) = events.recv_deadline(deadline) {
        if event == want {
            return true;
        }
    }
    false
}

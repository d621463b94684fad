//! Tests for the fatal-misuse panics and the harmless no-op paths.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeDevice;
use devio::{DeviceHandle, DeviceIo, TimerResolution, Trigger};

#[test]
#[should_panic(expected = "no device attached")]
fn create_daq_worker_without_device_panics() {
    let mut qdev = DeviceIo::<FakeDevice>::new();
    qdev.create_daq_worker(Trigger::SingleShotWake, None, 1);
}

#[test]
#[should_panic(expected = "no device attached")]
fn create_job_worker_without_device_panics() {
    let mut qdev = DeviceIo::<FakeDevice>::new();
    qdev.create_job_worker(None);
}

#[test]
#[should_panic(expected = "create_daq_worker")]
fn start_daq_worker_without_create_panics() {
    let mut qdev = DeviceIo::with_device(common::fake_handle(true));
    qdev.start_daq_worker();
}

#[test]
#[should_panic(expected = "create_job_worker")]
fn start_job_worker_without_create_panics() {
    let mut qdev = DeviceIo::with_device(common::fake_handle(true));
    qdev.start_job_worker();
}

#[test]
#[should_panic(expected = "attached only once")]
fn attaching_a_second_device_panics() {
    let mut qdev = DeviceIo::with_device(common::fake_handle(true));
    qdev.attach_device(Arc::new(DeviceHandle::new("Other", FakeDevice::new())));
}

#[test]
fn quit_before_create_is_fine() {
    let mut qdev = DeviceIo::<FakeDevice>::new();
    assert!(qdev.quit());
    assert!(qdev.quit());
}

#[test]
fn mode_mismatched_requests_are_noops() {
    common::init_logs();
    let mut qdev = DeviceIo::with_device(common::fake_handle(true));
    qdev.create_daq_worker(
        Trigger::TimerDriven {
            interval: Duration::from_millis(100),
            resolution: TimerResolution::Coarse,
        },
        Some(Box::new(|d: &mut FakeDevice| Ok(d.fake_query()))),
        1,
    );
    assert!(qdev.start());

    // None of these match the timer-driven mode; all must be harmless.
    qdev.wake_up_daq();
    qdev.pause_daq();
    qdev.unpause_daq();
    let remote = qdev.daq_remote().expect("daq worker exists");
    remote.wake_up();
    remote.pause();
    remote.unpause();

    assert!(qdev.quit());
}

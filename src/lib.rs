//! # devio
//!
//! A framework for multithreaded data acquisition and communication with a
//! single stateful I/O device. All device I/O is offloaded to *workers*, each
//! running on its own dedicated thread:
//!
//! - The **acquisition worker** repeatedly performs a device query, either
//!   periodically or aperiodically, depending on its [`Trigger`] mode.
//! - The **job worker** maintains a thread-safe queue of desired device I/O
//!   operations, *jobs*, and sends them out first-in, first-out whenever it
//!   is woken by a drain request.
//!
//! Both workers serialize device access through the exclusive lock inside
//! [`DeviceHandle`], and both start and stop deterministically under the
//! control of the owning [`DeviceIo`] orchestrator: `start` blocks until the
//! worker is definitely inside its loop, `quit` blocks until it has left it.
//!
//! ## Crate structure
//!
//! - **`device`**: the [`DeviceHandle`] wrapping a user device behind the
//!   exclusive lock, with a liveness flag and display name.
//! - **`daq`**: the acquisition worker and its three trigger modes.
//! - **`jobs`**: the command queue (with its sentinel drain protocol) and the
//!   job worker.
//! - **`device_io`**: the [`DeviceIo`] orchestrator and the remote handles.
//! - **`signals`**: zero-payload outward notifications ([`DevIoEvent`]).
//! - **`counters`**: lock-free aggregate statistics ([`IoStats`]).
//! - **`config`**: serde-deserializable worker settings.
//! - **`error`**: the [`DevIoError`] type for recoverable runtime errors.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use devio::{DeviceHandle, DeviceIo, TimerResolution, Trigger};
//!
//! struct Thermometer;
//! impl Thermometer {
//!     fn query_temperature(&mut self) -> devio::Result<bool> {
//!         // Device I/O goes here; report success/failure.
//!         Ok(true)
//!     }
//! }
//!
//! let dev = Arc::new(DeviceHandle::new("Thermo", Thermometer));
//! let mut qdev = DeviceIo::with_device(Arc::clone(&dev));
//! qdev.create_daq_worker(
//!     Trigger::TimerDriven {
//!         interval: Duration::from_millis(100),
//!         resolution: TimerResolution::Precise,
//!     },
//!     Some(Box::new(|dev: &mut Thermometer| dev.query_temperature())),
//!     3,
//! );
//! let events = qdev.subscribe();
//! assert!(qdev.start());
//! // ... consume events, read qdev.obtained_daq_rate_hz(), ...
//! assert!(qdev.quit());
//! ```

pub mod config;
pub mod counters;
pub mod daq;
pub mod device;
pub mod device_io;
pub mod error;
pub mod jobs;
pub mod signals;

mod handshake;

pub use config::DaqWorkerConfig;
pub use counters::IoStats;
pub use daq::{QueryFn, TimerResolution, Trigger, TriggerKind};
pub use device::DeviceHandle;
pub use device_io::{DaqRemote, DeviceIo};
pub use error::{DevIoError, Result};
pub use jobs::{Instruction, Job, JobArgs, JobFn, JobsHandler, JobsRemote};
pub use signals::DevIoEvent;

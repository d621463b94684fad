//! Custom error types for the framework.
//!
//! This module defines the primary error type, `DevIoError`, for the crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way
//! to represent the *recoverable* failures of the worker machinery:
//!
//! - **`Query`**: A device-query callback reported a failure it could not
//!   express as a plain unsuccessful result. The acquisition worker logs it
//!   and counts it against the not-alive threshold; it never propagates past
//!   the worker boundary.
//! - **`JobFailed`**: A queued device operation returned an error while being
//!   drained. The job worker logs it and continues with the next job.
//! - **`JobNotInvocable`**: A named job reached the default job handling
//!   routine, which only knows how to run invocable instructions. Configure a
//!   jobs handler to interpret named commands.
//! - **`ShutdownTimeout`**: A worker thread failed to confirm its stop
//!   handshake within the join timeout. Surfaced as a `false` return from
//!   `DeviceIo::quit`, never as a panic.
//!
//! Misuse errors (attaching a device twice, starting a worker that was never
//! created) are deliberately *not* part of this enum: they are programmer
//! errors with no partial state to clean up and panic instead.

use std::time::Duration;

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, DevIoError>;

/// Recoverable runtime errors raised by the workers.
#[derive(Error, Debug)]
pub enum DevIoError {
    /// A device-query callback failed with an error rather than a plain
    /// unsuccessful result.
    #[error("Device query error: {0}")]
    Query(String),

    /// A queued device operation failed while being drained.
    #[error("Job execution error: {0}")]
    JobFailed(String),

    /// A named job instruction reached the default job handling routine.
    #[error("Job '{0}' is not invocable and no jobs handler is configured")]
    JobNotInvocable(String),

    /// A worker thread did not confirm its stop handshake in time.
    #[error("Worker '{0}' failed to stop within {1:?}")]
    ShutdownTimeout(String, Duration),
}

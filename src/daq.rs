//! The data-acquisition worker.
//!
//! The worker repeatedly performs a device query in one of three trigger
//! modes, fixed at construction:
//!
//! - **Timer-driven**: a repeating interval timer fires the acquisition. The
//!   timer lives on the worker's own thread, so stop requests are relayed as
//!   a message into its loop rather than called directly.
//! - **Single-shot wake-up**: the worker parks on a wait condition and runs
//!   one acquisition per [`wake-up`](crate::DaqRemote::wake_up).
//! - **Continuous pausable**: the worker free-runs acquisitions and starts in
//!   the paused state, so a caller can safely command the device to start
//!   streaming before data flows.
//!
//! All three modes share `perform_acquisition`: lock the device, track
//! interval/rate statistics, run the user query inside a failure boundary,
//! unlock, then either raise `DaqUpdated` or — once the consecutive-failure
//! threshold is breached — mark the device dead, stop, and raise
//! `ConnectionLost`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::counters::IoStats;
use crate::device::DeviceHandle;
use crate::handshake::Gate;
use crate::signals::{DevIoEvent, SignalHub};
use crate::Result;

/// Span over which the obtained acquisition rate is recomputed.
const RATE_WINDOW: Duration = Duration::from_millis(1000);

/// Idle sleep per loop iteration while paused, to not hog the CPU.
const PAUSE_QUANTUM: Duration = Duration::from_millis(10);

/// Signature of the user-supplied device-query callback.
///
/// Runs under the exclusive device lock. `Ok(true)` means the communication
/// was successful; `Ok(false)` or `Err` counts against the not-alive
/// threshold. Must be bounded: an acquisition in flight cannot be cancelled.
pub type QueryFn<D> = Box<dyn FnMut(&mut D) -> Result<bool> + Send>;

/// How the acquisition worker decides when to perform a device query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Fire on a repeating interval timer.
    TimerDriven {
        /// Desired acquisition update interval.
        interval: Duration,
        /// Cadence accuracy class of the timer.
        resolution: TimerResolution,
    },
    /// Fire once per external wake-up request.
    SingleShotWake,
    /// Free-run with a pause/unpause request flag; starts paused.
    ContinuousPausable,
}

impl Trigger {
    /// The mode tag, without the timer parameters.
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::TimerDriven { .. } => TriggerKind::TimerDriven,
            Trigger::SingleShotWake => TriggerKind::SingleShotWake,
            Trigger::ContinuousPausable => TriggerKind::ContinuousPausable,
        }
    }
}

/// The trigger mode tag, used by configuration and mode checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// See [`Trigger::TimerDriven`].
    TimerDriven,
    /// See [`Trigger::SingleShotWake`].
    SingleShotWake,
    /// See [`Trigger::ContinuousPausable`].
    ContinuousPausable,
}

/// Cadence accuracy of the timer-driven mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerResolution {
    /// Keep a fixed cadence: each deadline is the previous deadline plus the
    /// interval, so timing error does not accumulate.
    Precise,
    /// Re-arm from "now" after each acquisition; cheaper, drifts by the
    /// acquisition duration.
    Coarse,
}

/// Message relayed into the timer-driven worker's own loop.
#[derive(Debug)]
pub(crate) enum DaqCommand {
    Stop,
}

/// Trigger/stop state shared between the acquisition worker thread and its
/// controllers.
pub(crate) struct DaqShared {
    running: AtomicBool,
    pause_requested: AtomicBool,
    wake_pending: Mutex<bool>,
    wake_cv: Condvar,
    pub(crate) started: Gate,
    pub(crate) stopped: Gate,
}

impl DaqShared {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            pause_requested: AtomicBool::new(false),
            wake_pending: Mutex::new(false),
            wake_cv: Condvar::new(),
            started: Gate::new(),
            stopped: Gate::new(),
        }
    }

    /// Requests one acquisition in single-shot mode. The pending flag is
    /// latched, so a wake-up issued before the worker re-enters its wait is
    /// never lost.
    pub(crate) fn wake_up(&self) {
        let mut pending = self.wake_pending.lock();
        *pending = true;
        self.wake_cv.notify_all();
    }

    /// Stops the worker from a foreign thread and wakes it for the final
    /// time. Safe for the single-shot and continuous modes; the timer-driven
    /// mode uses the control-channel relay instead.
    pub(crate) fn request_stop(&self) {
        let _pending = self.wake_pending.lock();
        self.running.store(false, Ordering::Release);
        self.wake_cv.notify_all();
    }

    /// Flips the pause-request flag. Read by the worker's own loop without
    /// additional locking — an intentionally accepted benign race: the loop
    /// re-checks every iteration, so a late flag merely delays one iteration.
    pub(crate) fn set_pause(&self, pause: bool) {
        self.pause_requested.store(pause, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn is_pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::Acquire)
    }
}

/// The acquisition worker. Runs on its own dedicated thread.
pub(crate) struct DaqWorker<D> {
    pub(crate) device: Arc<DeviceHandle<D>>,
    trigger: Trigger,
    query: Option<QueryFn<D>>,
    critical_not_alive_count: u32,
    stats: Arc<IoStats>,
    signals: Arc<SignalHub>,
    shared: Arc<DaqShared>,
    control: Option<Receiver<DaqCommand>>,
    // Interval/rate tracking, local to the worker thread.
    interval_ref: Option<Instant>,
    rate_window_start: Instant,
    rate_accumulator: u32,
}

impl<D> DaqWorker<D> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        device: Arc<DeviceHandle<D>>,
        trigger: Trigger,
        query: Option<QueryFn<D>>,
        critical_not_alive_count: u32,
        stats: Arc<IoStats>,
        signals: Arc<SignalHub>,
        shared: Arc<DaqShared>,
        control: Option<Receiver<DaqCommand>>,
    ) -> Self {
        Self {
            device,
            trigger,
            query,
            critical_not_alive_count,
            stats,
            signals,
            shared,
            control,
            interval_ref: None,
            rate_window_start: Instant::now(),
            rate_accumulator: 0,
        }
    }

    /// The worker thread body. Dispatches to the loop of the configured
    /// trigger mode and opens the stopped gate on exit.
    pub(crate) fn run(mut self) {
        debug!("Worker_DAQ  {}: starting", self.device.name());

        match self.trigger {
            Trigger::TimerDriven { interval, resolution } => {
                match self.control.take() {
                    Some(control) => self.run_timer_driven(&control, interval, resolution),
                    None => error!(
                        "Worker_DAQ  {}: timer-driven worker has no control channel",
                        self.device.name()
                    ),
                }
            }
            Trigger::SingleShotWake => self.run_single_shot(),
            Trigger::ContinuousPausable => self.run_continuous(),
        }

        debug!("Worker_DAQ  {}: has stopped", self.device.name());
        // Open both gates: even an aborted start must not deadlock a caller.
        self.shared.started.open();
        self.shared.stopped.open();
    }

    fn run_timer_driven(
        &mut self,
        control: &Receiver<DaqCommand>,
        interval: Duration,
        resolution: TimerResolution,
    ) {
        // Arming the timer is entering the loop; the control channel buffers
        // any Stop sent from this point on, so the start can be confirmed
        // right away.
        debug!(
            "Worker_DAQ  {}: timer armed at {:?} ({:?})",
            self.device.name(),
            interval,
            resolution
        );
        self.shared.started.open();

        let mut deadline = Instant::now() + interval;
        loop {
            match control.recv_deadline(deadline) {
                Ok(DaqCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    self.perform_acquisition();
                    if !self.shared.is_running() {
                        // Self-terminated on a threshold breach mid-cycle.
                        break;
                    }
                    deadline = match resolution {
                        TimerResolution::Precise => deadline + interval,
                        TimerResolution::Coarse => Instant::now() + interval,
                    };
                }
            }
        }
    }

    fn run_single_shot(&mut self) {
        let mut init = true;
        loop {
            {
                let mut pending = self.shared.wake_pending.lock();
                if init {
                    // The wake-pending flag is latched, so confirming the
                    // start here cannot lose a wake-up issued right after
                    // start() returns.
                    debug!("Worker_DAQ  {}: has started", self.device.name());
                    self.shared.started.open();
                    init = false;
                }
                while !*pending && self.shared.is_running() {
                    self.shared.wake_cv.wait(&mut pending);
                }
                *pending = false;
            }

            // Prevents one more acquisition on the final wake after a stop.
            if !self.shared.is_running() {
                break;
            }
            debug!("Worker_DAQ  {}: has woken up", self.device.name());
            self.perform_acquisition();
        }
    }

    fn run_continuous(&mut self) {
        // Start up paused, and say so before confirming the start: the
        // caller can then command the device to start streaming before any
        // data is read.
        self.shared.set_pause(true);
        let mut paused_confirmed = true;
        debug!("Worker_DAQ  {}: starting up paused", self.device.name());
        self.signals.emit(DevIoEvent::DaqPaused);
        self.shared.started.open();

        while self.shared.is_running() {
            if self.shared.is_pause_requested() {
                if !paused_confirmed {
                    debug!("Worker_DAQ  {}: has paused", self.device.name());
                    self.signals.emit(DevIoEvent::DaqPaused);
                    paused_confirmed = true;
                }
                thread::sleep(PAUSE_QUANTUM);
            } else {
                if paused_confirmed {
                    debug!("Worker_DAQ  {}: has unpaused", self.device.name());
                    paused_confirmed = false;
                }
                self.perform_acquisition();
            }
        }
    }

    /// One acquisition update, shared by all trigger modes.
    fn perform_acquisition(&mut self) {
        {
            let mut dev = self.device.lock();
            let update = self.stats.incr_update_counter_daq();
            debug!("Worker_DAQ  {}: lock   #{update}", self.device.name());

            let now = Instant::now();
            if let Some(prev) = self.interval_ref.replace(now) {
                self.stats
                    .set_obtained_interval_ms(now.duration_since(prev).as_secs_f64() * 1e3);

                self.rate_accumulator += 1;
                let window = now.duration_since(self.rate_window_start);
                if window >= RATE_WINDOW {
                    let window_ms = window.as_secs_f64() * 1e3;
                    // A degenerate window yields NaN, not an error.
                    self.stats
                        .set_obtained_rate_hz(f64::from(self.rate_accumulator) / window_ms * 1e3);
                    self.rate_window_start = now;
                    self.rate_accumulator = 0;
                }
            } else {
                self.rate_window_start = now;
            }

            if let Some(query) = self.query.as_mut() {
                match query(&mut dev) {
                    Ok(true) => self.stats.reset_not_alive(),
                    Ok(false) => {
                        self.stats.incr_not_alive();
                    }
                    Err(err) => {
                        error!("Worker_DAQ  {}: {err}", self.device.name());
                        self.stats.incr_not_alive();
                    }
                }
            }

            debug!("Worker_DAQ  {}: unlock #{update}", self.device.name());
        }

        // The lock is released before the threshold check, but the check
        // still happens inside the same call: the worker can self-terminate
        // mid-cycle, and quit() must tolerate an already-stopped worker.
        let critical = self.critical_not_alive_count;
        if critical > 0 && self.stats.not_alive_counter_daq() >= critical {
            error!(
                "Worker_DAQ  {}: lost connection to device",
                self.device.name()
            );
            self.device.set_alive(false);
            // Internal stop, not the cross-thread relay: this runs on the
            // worker's own thread, where flipping the flag is always safe.
            self.shared.running.store(false, Ordering::Release);
            self.signals.emit(DevIoEvent::ConnectionLost);
            return;
        }

        self.signals.emit(DevIoEvent::DaqUpdated);
    }
}

//! The orchestrator owning both workers and the control surface.
//!
//! `DeviceIo` creates the workers, binds them to dedicated named threads,
//! runs the synchronous start/stop handshakes, and exposes the operations a
//! caller drives the framework with: pause/unpause/wake-up, enqueue/send, and
//! an idempotent quit.
//!
//! Misuse — attaching a device twice, creating a worker with no device
//! attached, or starting a worker that was never created — panics by design:
//! these are programmer errors, not runtime conditions.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use crate::config::DaqWorkerConfig;
use crate::counters::IoStats;
use crate::daq::{DaqCommand, DaqShared, DaqWorker, QueryFn, Trigger, TriggerKind};
use crate::device::DeviceHandle;
use crate::error::DevIoError;
use crate::jobs::{Instruction, JobArgs, JobQueue, JobWorker, JobsHandler, JobsRemote, JobsShared};
use crate::signals::{DevIoEvent, SignalHub};

/// How long `quit` waits for a worker to confirm its stop handshake.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

struct DaqRuntime<D> {
    kind: TriggerKind,
    shared: Arc<DaqShared>,
    control: Option<Sender<DaqCommand>>,
    worker: Option<DaqWorker<D>>,
    thread: Option<JoinHandle<()>>,
}

struct JobsRuntime<D> {
    shared: Arc<JobsShared>,
    queue: Arc<JobQueue<D>>,
    worker: Option<JobWorker<D>>,
    thread: Option<JoinHandle<()>>,
}

/// A clonable handle for triggering the acquisition worker from any thread.
///
/// Requests that do not match the worker's trigger mode are no-ops.
#[derive(Clone)]
pub struct DaqRemote {
    kind: TriggerKind,
    shared: Arc<DaqShared>,
}

impl DaqRemote {
    /// Requests one acquisition update (single-shot mode only).
    /// Fire-and-forget: returns immediately, does not wait for completion.
    pub fn wake_up(&self) {
        if self.kind == TriggerKind::SingleShotWake {
            self.shared.wake_up();
        }
    }

    /// Requests the paused state (continuous mode only). The worker confirms
    /// with a `DaqPaused` notification.
    pub fn pause(&self) {
        if self.kind == TriggerKind::ContinuousPausable {
            self.shared.set_pause(true);
        }
    }

    /// Requests leaving the paused state (continuous mode only).
    pub fn unpause(&self) {
        if self.kind == TriggerKind::ContinuousPausable {
            self.shared.set_pause(false);
        }
    }
}

/// The framework for multithreaded data acquisition and communication with
/// one stateful I/O device.
///
/// Device I/O is offloaded to up to two workers, each on a dedicated thread:
/// the acquisition worker (see [`Trigger`] for its modes) and the job worker
/// draining a FIFO command queue. Both serialize device access through the
/// [`DeviceHandle`]'s exclusive lock.
pub struct DeviceIo<D: Send + 'static> {
    device: Option<Arc<DeviceHandle<D>>>,
    stats: Arc<IoStats>,
    signals: Arc<SignalHub>,
    daq: Option<DaqRuntime<D>>,
    jobs: Option<JobsRuntime<D>>,
}

impl<D: Send + 'static> Default for DeviceIo<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Send + 'static> DeviceIo<D> {
    /// Creates an orchestrator with no device attached yet.
    pub fn new() -> Self {
        Self {
            device: None,
            stats: Arc::new(IoStats::new()),
            signals: Arc::new(SignalHub::new()),
            daq: None,
            jobs: None,
        }
    }

    /// Creates an orchestrator and attaches `device` in one step.
    pub fn with_device(device: Arc<DeviceHandle<D>>) -> Self {
        let mut io = Self::new();
        io.attach_device(device);
        io
    }

    /// Attaches the device the workers will talk to. Succeeds once.
    ///
    /// # Panics
    ///
    /// Panics if a device is already attached (fatal misuse).
    pub fn attach_device(&mut self, device: Arc<DeviceHandle<D>>) -> bool {
        if let Some(attached) = &self.device {
            panic!(
                "device can be attached only once; already attached to '{}'",
                attached.name()
            );
        }
        self.device = Some(device);
        true
    }

    /// The attached device, if any.
    pub fn device(&self) -> Option<&Arc<DeviceHandle<D>>> {
        self.device.as_ref()
    }

    /// The aggregate counters, readable from any thread.
    pub fn stats(&self) -> &IoStats {
        &self.stats
    }

    /// Number of acquisition updates attempted so far.
    pub fn update_counter_daq(&self) -> u64 {
        self.stats.update_counter_daq()
    }

    /// Number of job-queue drains performed so far.
    pub fn update_counter_jobs(&self) -> u64 {
        self.stats.update_counter_jobs()
    }

    /// Consecutive failed acquisition updates; reset on any success.
    pub fn not_alive_counter_daq(&self) -> u32 {
        self.stats.not_alive_counter_daq()
    }

    /// Measured interval between the two most recent acquisition updates, in
    /// milliseconds. NaN until enough updates have happened.
    pub fn obtained_daq_interval_ms(&self) -> f64 {
        self.stats.obtained_interval_ms()
    }

    /// Measured acquisition rate in hertz. NaN until the first rate window
    /// has elapsed.
    pub fn obtained_daq_rate_hz(&self) -> f64 {
        self.stats.obtained_rate_hz()
    }

    /// Registers a subscriber for the outward notifications.
    pub fn subscribe(&self) -> Receiver<DevIoEvent> {
        self.signals.subscribe()
    }

    // ----------------------------------------------------------------------
    //   Create workers
    // ----------------------------------------------------------------------

    /// Creates and configures the acquisition worker.
    ///
    /// `query` runs under the device lock on every update and reports
    /// success/failure; `critical_not_alive_count` consecutive failures mark
    /// the device dead (`0` = never give up).
    ///
    /// # Panics
    ///
    /// Panics if no device is attached (fatal misuse).
    pub fn create_daq_worker(
        &mut self,
        trigger: Trigger,
        query: Option<QueryFn<D>>,
        critical_not_alive_count: u32,
    ) {
        let device = self.attached("create_daq_worker");
        let shared = Arc::new(DaqShared::new());
        let (control_tx, control_rx) = match trigger.kind() {
            TriggerKind::TimerDriven => {
                let (tx, rx) = crossbeam_channel::unbounded();
                (Some(tx), Some(rx))
            }
            _ => (None, None),
        };

        let worker = DaqWorker::new(
            device,
            trigger,
            query,
            critical_not_alive_count,
            Arc::clone(&self.stats),
            Arc::clone(&self.signals),
            Arc::clone(&shared),
            control_rx,
        );
        self.daq = Some(DaqRuntime {
            kind: trigger.kind(),
            shared,
            control: control_tx,
            worker: Some(worker),
            thread: None,
        });
    }

    /// Creates the acquisition worker from a [`DaqWorkerConfig`].
    ///
    /// # Panics
    ///
    /// Panics if no device is attached (fatal misuse).
    pub fn create_daq_worker_from_config(
        &mut self,
        config: &DaqWorkerConfig,
        query: Option<QueryFn<D>>,
    ) {
        self.create_daq_worker(config.to_trigger(), query, config.critical_not_alive_count);
    }

    /// Creates and configures the job worker.
    ///
    /// With `handler` set to `None`, the default job handling applies:
    /// invocable instructions run directly, a failing job is logged and
    /// skipped, and named instructions are rejected. A custom handler
    /// receives every drained job instead.
    ///
    /// # Panics
    ///
    /// Panics if no device is attached (fatal misuse).
    pub fn create_job_worker(&mut self, handler: Option<JobsHandler<D>>) {
        let device = self.attached("create_job_worker");
        let shared = Arc::new(JobsShared::new());
        let queue = Arc::new(JobQueue::new());

        let worker = JobWorker {
            device,
            stats: Arc::clone(&self.stats),
            signals: Arc::clone(&self.signals),
            shared: Arc::clone(&shared),
            queue: Arc::clone(&queue),
            handler,
        };
        self.jobs = Some(JobsRuntime {
            shared,
            queue,
            worker: Some(worker),
            thread: None,
        });
    }

    // ----------------------------------------------------------------------
    //   Start workers
    // ----------------------------------------------------------------------

    /// Starts all created workers. Returns `false` if any start failed
    /// because the device is not alive.
    pub fn start(&mut self) -> bool {
        let mut success = true;
        if self.jobs.is_some() {
            success &= self.start_job_worker();
        }
        if self.daq.is_some() {
            success &= self.start_daq_worker();
        }
        success
    }

    /// Starts the acquisition worker and blocks until it confirms having
    /// entered its loop. Returns `false` (non-fatal) if the device reports
    /// not-alive.
    ///
    /// # Panics
    ///
    /// Panics if [`create_daq_worker`](Self::create_daq_worker) was never
    /// called (fatal misuse).
    pub fn start_daq_worker(&mut self) -> bool {
        let Some(rt) = self.daq.as_mut() else {
            panic!(
                "can't start Worker_DAQ because it does not exist; \
                 did you forget to call create_daq_worker() first?"
            );
        };
        let Some(worker) = rt.worker.take() else {
            warn!("Worker_DAQ: already started");
            return true;
        };

        if !worker.device.is_alive() {
            warn!("Worker_DAQ  {}: device is not alive", worker.device.name());
            rt.worker = Some(worker);
            return false;
        }

        debug!("Worker_DAQ  {}: start requested...", worker.device.name());
        let thread_name = format!("{}_DAQ", worker.device.name());
        match thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker.run())
        {
            Ok(handle) => rt.thread = Some(handle),
            Err(err) => {
                error!("Worker_DAQ: failed to spawn thread '{thread_name}': {err}");
                return false;
            }
        }

        // Synchronous by design: the worker is definitely inside its loop
        // once this returns, so an immediate wake-up/pause is observed.
        rt.shared.started.wait_open();
        true
    }

    /// Starts the job worker and blocks until it confirms having entered its
    /// loop. Returns `false` (non-fatal) if the device reports not-alive.
    ///
    /// # Panics
    ///
    /// Panics if [`create_job_worker`](Self::create_job_worker) was never
    /// called (fatal misuse).
    pub fn start_job_worker(&mut self) -> bool {
        let Some(rt) = self.jobs.as_mut() else {
            panic!(
                "can't start Worker_jobs because it does not exist; \
                 did you forget to call create_job_worker() first?"
            );
        };
        let Some(worker) = rt.worker.take() else {
            warn!("Worker_jobs: already started");
            return true;
        };

        if !worker.device.is_alive() {
            warn!("Worker_jobs {}: device is not alive", worker.device.name());
            rt.worker = Some(worker);
            return false;
        }

        debug!("Worker_jobs {}: start requested...", worker.device.name());
        let thread_name = format!("{}_jobs", worker.device.name());
        match thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker.run())
        {
            Ok(handle) => rt.thread = Some(handle),
            Err(err) => {
                error!("Worker_jobs: failed to spawn thread '{thread_name}': {err}");
                return false;
            }
        }

        rt.shared.started.wait_open();
        true
    }

    // ----------------------------------------------------------------------
    //   Quit workers
    // ----------------------------------------------------------------------

    /// Stops all running workers and joins their threads. Idempotent: a
    /// second call, or a call after a worker self-terminated on a lost
    /// connection, returns `true` without re-blocking. Returns `false` only
    /// when a worker fails to confirm its stop within the join timeout.
    pub fn quit(&mut self) -> bool {
        let daq_ok = self.quit_daq_worker();
        let jobs_ok = self.quit_job_worker();
        daq_ok && jobs_ok
    }

    /// Stops the acquisition worker and joins its thread. See [`quit`](Self::quit).
    pub fn quit_daq_worker(&mut self) -> bool {
        let Some(rt) = self.daq.as_mut() else {
            return true;
        };
        let Some(handle) = rt.thread.take() else {
            // Never started, or already quit.
            return true;
        };
        let name = handle.thread().name().unwrap_or("Worker_DAQ").to_owned();

        if rt.shared.stopped.is_open() {
            // The worker self-terminated (connection lost mid-run); skip the
            // redundant stop handshake.
            info!("Closing thread {name}: already stopped");
        } else {
            debug!("Worker_DAQ: stop requested...");
            match rt.kind {
                // The periodic timer must be disarmed on the worker's own
                // thread, so stop is relayed as a message into its loop.
                TriggerKind::TimerDriven => {
                    if let Some(control) = &rt.control {
                        let _ = control.send(DaqCommand::Stop);
                    }
                }
                TriggerKind::SingleShotWake | TriggerKind::ContinuousPausable => {
                    rt.shared.request_stop();
                }
            }
            if !rt.shared.stopped.wait_open_for(JOIN_TIMEOUT) {
                error!(
                    "{}",
                    DevIoError::ShutdownTimeout(name.clone(), JOIN_TIMEOUT)
                );
                return false;
            }
        }

        Self::join_worker(handle, &name)
    }

    /// Stops the job worker and joins its thread. See [`quit`](Self::quit).
    pub fn quit_job_worker(&mut self) -> bool {
        let Some(rt) = self.jobs.as_mut() else {
            return true;
        };
        let Some(handle) = rt.thread.take() else {
            return true;
        };
        let name = handle.thread().name().unwrap_or("Worker_jobs").to_owned();

        if rt.shared.stopped.is_open() {
            info!("Closing thread {name}: already stopped");
        } else {
            debug!("Worker_jobs: stop requested...");
            rt.shared.request_stop();
            if !rt.shared.stopped.wait_open_for(JOIN_TIMEOUT) {
                error!(
                    "{}",
                    DevIoError::ShutdownTimeout(name.clone(), JOIN_TIMEOUT)
                );
                return false;
            }
        }

        Self::join_worker(handle, &name)
    }

    fn join_worker(handle: JoinHandle<()>, name: &str) -> bool {
        info!("Closing thread {name}...");
        match handle.join() {
            Ok(()) => {
                info!("Closing thread {name}: done");
                true
            }
            Err(_) => {
                error!("Closing thread {name}: FAILED (worker panicked)");
                false
            }
        }
    }

    // ----------------------------------------------------------------------
    //   Acquisition-worker related
    // ----------------------------------------------------------------------

    /// Requests the acquisition worker to pause (continuous mode only; no-op
    /// otherwise). The worker confirms with a `DaqPaused` notification.
    pub fn pause_daq(&self) {
        if let Some(rt) = &self.daq {
            if rt.kind == TriggerKind::ContinuousPausable {
                debug!("Worker_DAQ: pause requested...");
                rt.shared.set_pause(true);
            }
        }
    }

    /// Requests the acquisition worker to resume (continuous mode only;
    /// no-op otherwise).
    pub fn unpause_daq(&self) {
        if let Some(rt) = &self.daq {
            if rt.kind == TriggerKind::ContinuousPausable {
                debug!("Worker_DAQ: unpause requested...");
                rt.shared.set_pause(false);
            }
        }
    }

    /// Requests one acquisition update (single-shot mode only; no-op
    /// otherwise). Fire-and-forget.
    pub fn wake_up_daq(&self) {
        if let Some(rt) = &self.daq {
            if rt.kind == TriggerKind::SingleShotWake {
                debug!("Worker_DAQ: wake-up requested...");
                rt.shared.wake_up();
            }
        }
    }

    /// A handle for triggering the acquisition worker from other threads.
    /// `None` until the worker has been created.
    pub fn daq_remote(&self) -> Option<DaqRemote> {
        self.daq.as_ref().map(|rt| DaqRemote {
            kind: rt.kind,
            shared: Arc::clone(&rt.shared),
        })
    }

    // ----------------------------------------------------------------------
    //   Job-worker related
    // ----------------------------------------------------------------------

    /// Puts a job on the queue without waking the worker. No-op if no job
    /// worker was created.
    pub fn enqueue(&self, instruction: Instruction<D>, args: impl Into<JobArgs>) {
        if let Some(rt) = &self.jobs {
            rt.queue.push(crate::jobs::Job::new(instruction, args));
        }
    }

    /// Puts a job on the queue and immediately requests a drain. No-op if no
    /// job worker was created.
    pub fn send(&self, instruction: Instruction<D>, args: impl Into<JobArgs>) {
        if let Some(rt) = &self.jobs {
            rt.queue.push(crate::jobs::Job::new(instruction, args));
            rt.shared.request_drain();
        }
    }

    /// Wakes the job worker to drain the queue once. Idempotent: requests
    /// issued before the worker wakes coalesce into a single drain pass.
    /// No-op if no job worker was created.
    pub fn request_drain(&self) {
        if let Some(rt) = &self.jobs {
            debug!("Worker_jobs: drain requested...");
            rt.shared.request_drain();
        }
    }

    /// A handle for feeding the job worker from other threads. `None` until
    /// the worker has been created.
    pub fn jobs_remote(&self) -> Option<JobsRemote<D>> {
        self.jobs.as_ref().map(|rt| JobsRemote {
            queue: Arc::clone(&rt.queue),
            shared: Arc::clone(&rt.shared),
        })
    }

    fn attached(&self, op: &str) -> Arc<DeviceHandle<D>> {
        match &self.device {
            Some(device) => Arc::clone(device),
            None => panic!("can't {op} because there is no device attached; call attach_device() first"),
        }
    }
}

impl<D: Send + 'static> Drop for DeviceIo<D> {
    /// Best-effort teardown so a dropped orchestrator does not leak running
    /// worker threads. `quit` is idempotent, so an explicit quit beforehand
    /// makes this a no-op.
    fn drop(&mut self) {
        let _ = self.quit();
    }
}

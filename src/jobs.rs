//! The job worker and its command queue.
//!
//! Desired device I/O operations, called *jobs*, are put onto a thread-safe
//! FIFO queue. The job worker sleeps until woken by a drain request, then
//! sends the queued jobs out to the device first-in, first-out under the
//! exclusive device lock, and goes back to sleep.
//!
//! # The sentinel drain protocol
//!
//! The queue always holds one distinguished *sentinel* entry marking the end
//! of the current batch. A drain makes exactly two passes: pass 1 consumes
//! jobs up to the stale sentinel and discards it; pass 2 consumes anything
//! that was enqueued behind that watermark and reinserts a fresh sentinel.
//! An enqueue racing with a drain therefore lands either before the watermark
//! (processed by this drain) or after the reinserted sentinel (processed by
//! the next one) — it can never be skipped or double-processed. Forgetting to
//! reinsert the sentinel would deadlock all future drains, hence the
//! reinsertion happens unconditionally at the end of each pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use serde_json::Value;

use crate::counters::IoStats;
use crate::device::DeviceHandle;
use crate::handshake::Gate;
use crate::signals::{DevIoEvent, SignalHub};
use crate::Result;

/// Signature of a directly invocable job instruction.
pub type JobFn<D> = Box<dyn FnOnce(&mut D, &JobArgs) -> Result<()> + Send>;

/// Signature of an alternate job handling routine. When configured, every
/// drained job is passed to it instead of the default handling.
pub type JobsHandler<D> = Box<dyn FnMut(&mut D, Job<D>) + Send>;

/// A single queued device operation.
pub enum Instruction<D> {
    /// A device operation that can be invoked directly with the job's
    /// positional arguments.
    Call(JobFn<D>),
    /// An opaque named command, meaningful only to a custom jobs handler.
    Command(String),
}

impl<D> Instruction<D> {
    /// Wraps a closure as an invocable instruction.
    pub fn call<F>(f: F) -> Self
    where
        F: FnOnce(&mut D, &JobArgs) -> Result<()> + Send + 'static,
    {
        Instruction::Call(Box::new(f))
    }

    /// Wraps a named command for a custom jobs handler to interpret.
    pub fn command(name: impl Into<String>) -> Self {
        Instruction::Command(name.into())
    }

    fn describe(&self) -> &str {
        match self {
            Instruction::Call(_) => "<callable>",
            Instruction::Command(name) => name,
        }
    }
}

/// Positional arguments carried alongside a job instruction.
///
/// A bare value is normalized to a single-element list, mirroring the
/// convenience accepted by the enqueue operations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobArgs(Vec<Value>);

impl JobArgs {
    /// No arguments.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// A single argument.
    pub fn one(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    /// A list of arguments.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    /// The argument values, in order.
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// The argument at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Whether no arguments were given.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Value> for JobArgs {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(values) => Self(values),
            other => Self(vec![other]),
        }
    }
}

impl From<Vec<Value>> for JobArgs {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl From<()> for JobArgs {
    fn from((): ()) -> Self {
        Self::none()
    }
}

/// An `(instruction, args)` pair waiting on the command queue.
pub struct Job<D> {
    /// What to do.
    pub instruction: Instruction<D>,
    /// Positional arguments for the instruction.
    pub args: JobArgs,
}

impl<D> Job<D> {
    /// Pairs an instruction with its arguments.
    pub fn new(instruction: Instruction<D>, args: impl Into<JobArgs>) -> Self {
        Self {
            instruction,
            args: args.into(),
        }
    }
}

enum Slot<D> {
    Job(Job<D>),
    Sentinel,
}

/// The insertion-ordered command queue, including its sentinel.
pub(crate) struct JobQueue<D> {
    slots: SegQueue<Slot<D>>,
}

impl<D> JobQueue<D> {
    pub(crate) fn new() -> Self {
        let slots = SegQueue::new();
        slots.push(Slot::Sentinel);
        Self { slots }
    }

    /// Appends a job to the tail. Callable from any thread; never blocks.
    pub(crate) fn push(&self, job: Job<D>) {
        self.slots.push(Slot::Job(job));
    }

    /// Runs the two-pass sentinel drain, feeding each job to `each`.
    ///
    /// Only the job worker may call this; the sentinel invariant (exactly one
    /// sentinel present whenever no drain is in flight) depends on it.
    pub(crate) fn drain(&self, mut each: impl FnMut(Job<D>)) {
        for _pass in 0..2 {
            while let Some(slot) = self.slots.pop() {
                match slot {
                    Slot::Sentinel => break,
                    Slot::Job(job) => each(job),
                }
            }
            self.slots.push(Slot::Sentinel);
        }
    }
}

/// Wake/stop state shared between the job worker thread and its controllers.
pub(crate) struct JobsShared {
    running: AtomicBool,
    drain_pending: Mutex<bool>,
    wake_cv: Condvar,
    pub(crate) started: Gate,
    pub(crate) stopped: Gate,
}

impl JobsShared {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            drain_pending: Mutex::new(false),
            wake_cv: Condvar::new(),
            started: Gate::new(),
            stopped: Gate::new(),
        }
    }

    /// Requests one drain pass. Idempotent: requests issued before the worker
    /// wakes coalesce into a single pass. The pending flag persists, so a
    /// request can never be lost to a wake-before-wait race.
    pub(crate) fn request_drain(&self) {
        let mut pending = self.drain_pending.lock();
        *pending = true;
        self.wake_cv.notify_all();
    }

    /// Stops the worker and wakes it for the final time.
    pub(crate) fn request_stop(&self) {
        let _pending = self.drain_pending.lock();
        self.running.store(false, Ordering::Release);
        self.wake_cv.notify_all();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// A clonable handle for feeding the job worker from any thread.
pub struct JobsRemote<D> {
    pub(crate) queue: Arc<JobQueue<D>>,
    pub(crate) shared: Arc<JobsShared>,
}

impl<D> Clone for JobsRemote<D> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D> JobsRemote<D> {
    /// Appends a job to the queue without waking the worker.
    pub fn enqueue(&self, instruction: Instruction<D>, args: impl Into<JobArgs>) {
        self.queue.push(Job::new(instruction, args));
    }

    /// Appends a job and immediately requests a drain.
    pub fn send(&self, instruction: Instruction<D>, args: impl Into<JobArgs>) {
        self.enqueue(instruction, args);
        self.request_drain();
    }

    /// Wakes the worker to drain the queue once. Fire-and-forget.
    pub fn request_drain(&self) {
        self.shared.request_drain();
    }
}

/// The worker that owns the command queue. Runs on its own dedicated thread.
pub(crate) struct JobWorker<D> {
    pub(crate) device: Arc<DeviceHandle<D>>,
    pub(crate) stats: Arc<IoStats>,
    pub(crate) signals: Arc<SignalHub>,
    pub(crate) shared: Arc<JobsShared>,
    pub(crate) queue: Arc<JobQueue<D>>,
    pub(crate) handler: Option<JobsHandler<D>>,
}

impl<D> JobWorker<D> {
    /// The worker thread body: confirm start, then park on the wait condition
    /// and drain the queue exactly once per wake until stopped.
    pub(crate) fn run(mut self) {
        debug!("Worker_jobs {}: starting", self.device.name());
        let mut init = true;

        loop {
            {
                let mut pending = self.shared.drain_pending.lock();
                if init {
                    // The drain-pending flag is latched, so opening the
                    // started gate here cannot lose a request issued right
                    // after start() returns.
                    debug!("Worker_jobs {}: has started", self.device.name());
                    self.shared.started.open();
                    init = false;
                }
                while !*pending && self.shared.is_running() {
                    self.shared.wake_cv.wait(&mut pending);
                }
                *pending = false;
            }

            // Re-check running after the wake: no spurious drain after stop.
            if !self.shared.is_running() {
                break;
            }
            self.perform_jobs();
        }

        debug!("Worker_jobs {}: has stopped", self.device.name());
        self.shared.stopped.open();
    }

    /// Drains the queue once under the device lock, then raises `JobsUpdated`.
    fn perform_jobs(&mut self) {
        let queue = Arc::clone(&self.queue);
        let name = self.device.name().to_owned();
        let handler = &mut self.handler;

        {
            let mut dev = self.device.lock();
            let update = self.stats.incr_update_counter_jobs();
            debug!("Worker_jobs {name}: lock   #{update}");

            queue.drain(|job| {
                debug!("Worker_jobs {name}: {} {:?}", job.instruction.describe(), job.args);

                match handler {
                    Some(handler) => handler(&mut dev, job),
                    None => match job.instruction {
                        Instruction::Call(f) => {
                            // One bad job must not halt the worker.
                            if let Err(err) = f(&mut dev, &job.args) {
                                error!("Worker_jobs {name}: {err}");
                            }
                        }
                        Instruction::Command(cmd) => {
                            error!(
                                "Worker_jobs {name}: received job '{cmd}' that is not \
                                 invocable and no jobs handler is configured"
                            );
                        }
                    },
                }
            });

            debug!("Worker_jobs {name}: unlock #{update}");
        }

        self.signals.emit(DevIoEvent::JobsUpdated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn command_job(index: usize) -> Job<()> {
        Job::new(Instruction::command("probe"), JobArgs::one(index as u64))
    }

    fn drained_indices(queue: &JobQueue<()>) -> Vec<u64> {
        let mut seen = Vec::new();
        queue.drain(|job| {
            if let Some(value) = job.args.get(0).and_then(Value::as_u64) {
                seen.push(value);
            }
        });
        seen
    }

    #[test]
    fn drain_preserves_fifo_order() {
        let queue = JobQueue::new();
        for i in 0..5 {
            queue.push(command_job(i));
        }
        assert_eq!(drained_indices(&queue), vec![0, 1, 2, 3, 4]);
        // A second drain finds nothing but still leaves one sentinel behind.
        assert_eq!(drained_indices(&queue), Vec::<u64>::new());
    }

    #[test]
    fn drain_reinserts_exactly_one_sentinel() {
        let queue = JobQueue::<()>::new();
        queue.drain(|_| {});
        queue.drain(|_| {});
        assert_eq!(queue.slots.len(), 1);
    }

    #[test]
    fn concurrent_enqueue_never_loses_or_duplicates_jobs() {
        const N: u64 = 500;
        let queue = Arc::new(JobQueue::<()>::new());

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..N {
                    queue.push(Job::new(Instruction::command("probe"), JobArgs::one(i)));
                    if i % 50 == 0 {
                        thread::sleep(Duration::from_micros(100));
                    }
                }
            })
        };

        // Single consumer drains repeatedly while the producer races it.
        let mut seen = Vec::new();
        while seen.len() < N as usize {
            queue.drain(|job| {
                if let Some(value) = job.args.get(0).and_then(Value::as_u64) {
                    seen.push(value);
                }
            });
            thread::yield_now();
        }
        producer.join().expect("producer panicked");

        let expected: Vec<u64> = (0..N).collect();
        assert_eq!(seen, expected);
        assert_eq!(queue.slots.len(), 1);
    }

    #[test]
    fn bare_value_normalizes_to_single_element_list() {
        let args: JobArgs = Value::from("toggle LED").into();
        assert_eq!(args.values().len(), 1);

        let args: JobArgs = Value::from(vec![1, 2, 3]).into();
        assert_eq!(args.values().len(), 3);

        let args: JobArgs = ().into();
        assert!(args.is_empty());
    }
}

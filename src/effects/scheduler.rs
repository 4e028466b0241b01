//! Schedulers decide where and when effect work and deliveries run.

use crate::effects::disposable::Disposable;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::{Handle, TryCurrentError};

/// A unit of scheduled work.
pub type Job = Box<dyn FnOnce() + Send>;

/// Something that can run jobs now or later.
pub trait Scheduler: Send + Sync {
    /// The scheduler's notion of the current time.
    fn now(&self) -> Duration;

    /// Run `job` once `delay` has elapsed. Disposing the result before the
    /// job runs cancels it.
    fn schedule_after(&self, delay: Duration, job: Job) -> Disposable;

    fn schedule(&self, job: Job) -> Disposable {
        self.schedule_after(Duration::ZERO, job)
    }
}

impl<T: Scheduler + ?Sized> Scheduler for Arc<T> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> Disposable {
        (**self).schedule_after(delay, job)
    }

    fn schedule(&self, job: Job) -> Disposable {
        (**self).schedule(job)
    }
}

/// Runs every job inline on the calling thread, ignoring delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }

    fn schedule_after(&self, _delay: Duration, job: Job) -> Disposable {
        job();
        Disposable::empty()
    }
}

type JobKey<T> = (T, u64);

struct JobQueue<T: Ord> {
    next_seq: u64,
    jobs: BTreeMap<JobKey<T>, Job>,
}

impl<T: Ord> Default for JobQueue<T> {
    fn default() -> Self {
        Self {
            next_seq: 0,
            jobs: BTreeMap::new(),
        }
    }
}

impl<T: Ord + Copy> JobQueue<T> {
    fn push(&mut self, due: T, job: Job) -> JobKey<T> {
        let key = (due, self.next_seq);
        self.next_seq += 1;
        self.jobs.insert(key, job);
        key
    }

    fn pop_due(&mut self, until: T) -> Option<(T, Job)> {
        match self.jobs.first_key_value() {
            Some((&(due, _), _)) if due <= until => {
                self.jobs.pop_first().map(|((due, _), job)| (due, job))
            }
            _ => None,
        }
    }
}

/// A virtual-time scheduler for deterministic tests.
///
/// Time only moves when [`advance_by`](Self::advance_by),
/// [`advance_to`](Self::advance_to) or [`run`](Self::run) is called. Jobs due
/// at the same instant run in the order they were scheduled. Jobs run
/// outside the scheduler's lock, so they may schedule more work.
///
/// ```
/// use tka::effects::{Scheduler, TestScheduler};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = TestScheduler::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&fired);
/// scheduler.schedule_after(
///     Duration::from_secs(1),
///     Box::new(move || flag.store(true, Ordering::SeqCst)),
/// );
///
/// scheduler.advance_by(Duration::from_millis(999));
/// assert!(!fired.load(Ordering::SeqCst));
/// scheduler.advance_by(Duration::from_millis(1));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
#[derive(Clone, Default)]
pub struct TestScheduler {
    clock: Arc<Mutex<VirtualClock>>,
}

#[derive(Default)]
struct VirtualClock {
    now: Duration,
    queue: JobQueue<Duration>,
}

impl TestScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_by(&self, duration: Duration) {
        let target = self.clock.lock().now + duration;
        self.advance_to(target);
    }

    /// Run every job due at or before `target`, then set the clock to it.
    pub fn advance_to(&self, target: Duration) {
        loop {
            let next = {
                let mut clock = self.clock.lock();
                let next = clock.queue.pop_due(target);
                match &next {
                    Some((due, _)) => clock.now = clock.now.max(*due),
                    None => clock.now = clock.now.max(target),
                }
                next
            };
            match next {
                Some((_, job)) => job(),
                None => break,
            }
        }
    }

    /// Run jobs until none remain, moving the clock as far as needed.
    pub fn run(&self) {
        loop {
            let next = {
                let mut clock = self.clock.lock();
                let next = clock.queue.jobs.pop_first();
                if let Some(((due, _), _)) = &next {
                    clock.now = clock.now.max(*due);
                }
                next
            };
            match next {
                Some((_, job)) => job(),
                None => break,
            }
        }
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.clock.lock().queue.jobs.len()
    }
}

impl Scheduler for TestScheduler {
    fn now(&self) -> Duration {
        self.clock.lock().now
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> Disposable {
        let key = {
            let mut clock = self.clock.lock();
            let due = clock.now + delay;
            clock.queue.push(due, job)
        };
        let clock = Arc::downgrade(&self.clock);
        Disposable::new(move || {
            if let Some(clock) = clock.upgrade() {
                let removed = clock.lock().queue.jobs.remove(&key);
                drop(removed);
            }
        })
    }
}

impl fmt::Debug for TestScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.clock.lock();
        f.debug_struct("TestScheduler")
            .field("now", &clock.now)
            .field("pending", &clock.queue.jobs.len())
            .finish()
    }
}

/// Collects jobs for a single owning thread to run.
///
/// Effects running on worker threads can `receive_on` a queue scheduler so
/// their actions re-enter the store on the thread that calls
/// [`run_pending`](Self::run_pending), typically a UI or main loop.
#[derive(Clone)]
pub struct QueueScheduler {
    origin: Instant,
    queue: Arc<Mutex<JobQueue<Instant>>>,
}

impl Default for QueueScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            queue: Arc::new(Mutex::new(JobQueue::default())),
        }
    }

    /// Run every job that is due, returning how many ran.
    pub fn run_pending(&self) -> usize {
        let now = Instant::now();
        let mut ran = 0;
        loop {
            let next = self.queue.lock().pop_due(now);
            match next {
                Some((_, job)) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Time until the earliest queued job is due, if any job is queued.
    pub fn next_due_in(&self) -> Option<Duration> {
        self.queue
            .lock()
            .jobs
            .first_key_value()
            .map(|(&(due, _), _)| due.saturating_duration_since(Instant::now()))
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().jobs.len()
    }
}

impl Scheduler for QueueScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> Disposable {
        let key = self.queue.lock().push(Instant::now() + delay, job);
        let queue = Arc::downgrade(&self.queue);
        Disposable::new(move || {
            if let Some(queue) = queue.upgrade() {
                let removed = queue.lock().jobs.remove(&key);
                drop(removed);
            }
        })
    }
}

impl fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Runs jobs as tasks on a tokio runtime. Disposing aborts a job that has
/// not started yet.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
    origin: Instant,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            origin: Instant::now(),
        }
    }

    /// Use the runtime the caller is running on.
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> Disposable {
        let task = self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            job();
        });
        Disposable::new(move || task.abort())
    }
}

//! Minimal push-based stream used underneath effects and store state.
//!
//! An [`Observable`] is a cold producer: every call to
//! [`Observable::subscribe`] runs the producer again for the new
//! [`Subscriber`]. A subscriber sees zero or more `Next` events followed by at
//! most one terminal event (`Error` or `Completed`). Disposing the returned
//! [`Disposable`] stops delivery immediately and tears down the producer.

use crate::effects::disposable::{CompositeDisposable, Disposable, SerialDisposable};
use crate::effects::error::EffectError;
use crate::effects::scheduler::Scheduler;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A single notification delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<T> {
    Next(T),
    Error(EffectError),
    Completed,
}

impl<T> Event<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U> {
        match self {
            Event::Next(value) => Event::Next(f(value)),
            Event::Error(error) => Event::Error(error),
            Event::Completed => Event::Completed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Next(_))
    }
}

type Observer<T> = Box<dyn Fn(Event<T>) + Send + Sync>;

/// The receiving end of a subscription.
///
/// A subscriber closes itself on its first terminal event; later events are
/// dropped. Clones share the same closed flag.
pub struct Subscriber<T> {
    inner: Arc<SubscriberInner<T>>,
}

struct SubscriberInner<T> {
    observer: Observer<T>,
    closed: AtomicBool,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Subscriber<T> {
    pub fn new<F>(observer: F) -> Self
    where
        F: Fn(Event<T>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(SubscriberInner {
                observer: Box::new(observer),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn next(&self, value: T) {
        if !self.is_closed() {
            (self.inner.observer)(Event::Next(value));
        }
    }

    pub fn error(&self, error: EffectError) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            (self.inner.observer)(Event::Error(error));
        }
    }

    pub fn complete(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            (self.inner.observer)(Event::Completed);
        }
    }

    /// Deliver an event of any kind.
    pub fn on(&self, event: Event<T>) {
        match event {
            Event::Next(value) => self.next(value),
            Event::Error(error) => self.error(error),
            Event::Completed => self.complete(),
        }
    }

    /// Stop delivery without sending a terminal event.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("closed", &self.is_closed())
            .finish()
    }
}

type Producer<T> = Arc<dyn Fn(Subscriber<T>) -> Disposable + Send + Sync>;

/// A lazily evaluated, disposable stream of values.
pub struct Observable<T> {
    producer: Producer<T>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Observable")
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Build an observable from a producer function.
    ///
    /// The producer runs once per subscription and returns the disposable
    /// that tears down whatever it started.
    ///
    /// ```
    /// use tka::effects::{Disposable, Event, Observable};
    /// use std::sync::{Arc, Mutex};
    ///
    /// let numbers = Observable::create(|subscriber| {
    ///     subscriber.next(1);
    ///     subscriber.next(2);
    ///     subscriber.complete();
    ///     Disposable::empty()
    /// });
    ///
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let sink = Arc::clone(&seen);
    /// numbers.subscribe(move |event| sink.lock().unwrap().push(event));
    ///
    /// assert_eq!(
    ///     *seen.lock().unwrap(),
    ///     vec![Event::Next(1), Event::Next(2), Event::Completed]
    /// );
    /// ```
    pub fn create<F>(producer: F) -> Self
    where
        F: Fn(Subscriber<T>) -> Disposable + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(producer),
        }
    }

    /// Subscribe an existing subscriber.
    ///
    /// Disposing the result closes the subscriber before tearing down the
    /// producer, so no event is delivered after disposal.
    pub fn subscribe_with(&self, subscriber: Subscriber<T>) -> Disposable {
        let upstream = (self.producer)(subscriber.clone());
        Disposable::new(move || {
            subscriber.close();
            upstream.dispose();
        })
    }

    pub fn subscribe<F>(&self, observer: F) -> Disposable
    where
        F: Fn(Event<T>) + Send + Sync + 'static,
    {
        self.subscribe_with(Subscriber::new(observer))
    }

    /// Completes immediately without emitting.
    pub fn empty() -> Self {
        Self::create(|subscriber| {
            subscriber.complete();
            Disposable::empty()
        })
    }

    /// Never emits and never terminates.
    pub fn never() -> Self {
        Self::create(|_| Disposable::empty())
    }

    pub fn fail(error: EffectError) -> Self {
        Self::create(move |subscriber| {
            subscriber.error(error.clone());
            Disposable::empty()
        })
    }

    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.filter_map(move |value| Some(f(value)))
    }

    pub fn filter<F>(&self, predicate: F) -> Observable<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter_map(move |value| predicate(&value).then_some(value))
    }

    pub fn filter_map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::create(move |downstream: Subscriber<U>| {
            let f = Arc::clone(&f);
            source.subscribe(move |event| match event {
                Event::Next(value) => {
                    if let Some(mapped) = f(value) {
                        downstream.next(mapped);
                    }
                }
                Event::Error(error) => downstream.error(error),
                Event::Completed => downstream.complete(),
            })
        })
    }

    /// Run `effect` for every event before forwarding it.
    pub fn tap<F>(&self, effect: F) -> Observable<T>
    where
        F: Fn(&Event<T>) + Send + Sync + 'static,
    {
        let source = self.clone();
        let effect = Arc::new(effect);
        Observable::create(move |downstream: Subscriber<T>| {
            let effect = Arc::clone(&effect);
            source.subscribe(move |event| {
                effect(&event);
                downstream.on(event);
            })
        })
    }

    /// Subscribe to every source at once and interleave their values.
    ///
    /// Completes once every source has completed. The first error is
    /// forwarded and the remaining sources are disposed.
    pub fn merge(sources: Vec<Observable<T>>) -> Self {
        let sources = Arc::new(sources);
        Self::create(move |downstream| {
            if sources.is_empty() {
                downstream.complete();
                return Disposable::empty();
            }
            let remaining = Arc::new(AtomicUsize::new(sources.len()));
            let composite = CompositeDisposable::new();
            for source in sources.iter() {
                if downstream.is_closed() {
                    break;
                }
                let downstream = downstream.clone();
                let remaining = Arc::clone(&remaining);
                let siblings = composite.clone();
                let subscription = source.subscribe(move |event| match event {
                    Event::Next(value) => downstream.next(value),
                    Event::Error(error) => {
                        downstream.error(error);
                        siblings.dispose();
                    }
                    Event::Completed => {
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            downstream.complete();
                            siblings.dispose();
                        }
                    }
                });
                composite.add(subscription);
            }
            composite.into_disposable()
        })
    }

    /// Subscribe to the sources one after another.
    ///
    /// Each source starts only after the previous one completed. An error
    /// stops the sequence.
    pub fn concat(sources: Vec<Observable<T>>) -> Self {
        let sources = Arc::new(sources);
        Self::create(move |downstream| {
            let stages = SerialDisposable::new();
            subscribe_stage(Arc::clone(&sources), 0, downstream, stages.clone());
            stages.into_disposable()
        })
    }

    /// Shift `Next` and `Completed` events by `delay` on `scheduler`.
    ///
    /// Errors are forwarded without delay.
    pub fn delay(&self, delay: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        self.reschedule(scheduler, Some(delay))
    }

    /// Deliver every event through `scheduler`.
    pub fn receive_on(&self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.reschedule(scheduler, None)
    }

    fn reschedule(&self, scheduler: Arc<dyn Scheduler>, delay: Option<Duration>) -> Self {
        let source = self.clone();
        Self::create(move |downstream| {
            let pending = PendingJobs::default();
            let scheduler = Arc::clone(&scheduler);
            let jobs = pending.clone();
            let upstream = source.subscribe(move |event| {
                if let (Event::Error(error), Some(_)) = (&event, delay) {
                    downstream.error(error.clone());
                    jobs.dispose();
                    return;
                }
                let downstream = downstream.clone();
                let finished = jobs.clone();
                let key = jobs.reserve();
                let terminal = event.is_terminal();
                let job = Box::new(move || {
                    downstream.on(event);
                    finished.finish(key);
                    if terminal {
                        finished.dispose();
                    }
                });
                let handle = match delay {
                    Some(delay) => scheduler.schedule_after(delay, job),
                    None => scheduler.schedule(job),
                };
                jobs.store(key, handle);
            });
            Disposable::new(move || {
                upstream.dispose();
                pending.dispose();
            })
        })
    }

    /// Perform the subscription itself on `scheduler`.
    pub fn subscribe_on(&self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.subscribe_later(scheduler, Duration::ZERO)
    }

    /// Postpone the subscription by `delay` on `scheduler`.
    pub fn delay_subscription(&self, delay: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        self.subscribe_later(scheduler, delay)
    }

    fn subscribe_later(&self, scheduler: Arc<dyn Scheduler>, delay: Duration) -> Self {
        let source = self.clone();
        Self::create(move |downstream| {
            let stages = SerialDisposable::new();
            let source = source.clone();
            let started = stages.clone();
            let job = scheduler.schedule_after(
                delay,
                Box::new(move || {
                    started.set(1, source.subscribe_with(downstream));
                }),
            );
            stages.set(0, job);
            stages.into_disposable()
        })
    }

    /// Subscribe, take whatever was emitted synchronously first, and dispose.
    pub fn first_immediate(&self) -> Option<T> {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        let subscription = self.subscribe(move |event| {
            if let Event::Next(value) = event {
                let mut slot = sink.lock();
                if slot.is_none() {
                    *slot = Some(value);
                }
            }
        });
        subscription.dispose();
        let value = slot.lock().take();
        value
    }
}

/// Handles of scheduled deliveries that have not run yet.
///
/// A job removes its own handle once it has run, so a long-lived stream only
/// holds handles for deliveries still waiting on the scheduler.
#[derive(Clone, Default)]
struct PendingJobs {
    state: Arc<Mutex<PendingState>>,
}

#[derive(Default)]
struct PendingState {
    next_key: u64,
    live: HashMap<u64, Disposable>,
    /// Jobs that ran before `schedule` handed back their handle.
    ran_early: HashSet<u64>,
    disposed: bool,
}

impl PendingJobs {
    fn reserve(&self) -> u64 {
        let mut state = self.state.lock();
        let key = state.next_key;
        state.next_key += 1;
        key
    }

    fn store(&self, key: u64, handle: Disposable) {
        let mut state = self.state.lock();
        if state.ran_early.remove(&key) {
            drop(state);
            drop(handle);
        } else if state.disposed {
            drop(state);
            handle.dispose();
        } else {
            state.live.insert(key, handle);
        }
    }

    fn finish(&self, key: u64) {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.live.remove(&key);
            if removed.is_none() {
                state.ran_early.insert(key);
            }
            removed
        };
        drop(removed);
    }

    fn dispose(&self) {
        let live = {
            let mut state = self.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.live)
        };
        for handle in live.into_values() {
            handle.dispose();
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    /// Emit `value` and complete.
    pub fn just(value: T) -> Self {
        Self::create(move |subscriber| {
            subscriber.next(value.clone());
            subscriber.complete();
            Disposable::empty()
        })
    }

    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let values: Arc<[T]> = values.into_iter().collect();
        Self::create(move |subscriber| {
            for value in values.iter() {
                if subscriber.is_closed() {
                    break;
                }
                subscriber.next(value.clone());
            }
            subscriber.complete();
            Disposable::empty()
        })
    }

    /// Drop values considered equal to the previously forwarded one.
    pub fn distinct_until_changed_by<F>(&self, eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let source = self.clone();
        let eq = Arc::new(eq);
        Self::create(move |downstream| {
            let eq = Arc::clone(&eq);
            let last: Mutex<Option<T>> = Mutex::new(None);
            source.subscribe(move |event| match event {
                Event::Next(value) => {
                    let changed = {
                        let mut last = last.lock();
                        match last.as_ref() {
                            Some(previous) if eq(previous, &value) => false,
                            _ => {
                                *last = Some(value.clone());
                                true
                            }
                        }
                    };
                    if changed {
                        downstream.next(value);
                    }
                }
                terminal => downstream.on(terminal),
            })
        })
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Observable<T> {
    pub fn distinct_until_changed(&self) -> Self {
        self.distinct_until_changed_by(|a, b| a == b)
    }
}

impl Observable<u64> {
    /// Emit 0, 1, 2, ... every `period` on `scheduler` until disposed.
    ///
    /// Needs a scheduler that honours delays; on an immediate scheduler the
    /// ticks never yield.
    pub fn interval(period: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::create(move |downstream| {
            let ticks = SerialDisposable::new();
            schedule_tick(Arc::clone(&scheduler), period, downstream, ticks.clone(), 0);
            ticks.into_disposable()
        })
    }
}

fn subscribe_stage<T: Send + 'static>(
    sources: Arc<Vec<Observable<T>>>,
    index: usize,
    downstream: Subscriber<T>,
    stages: SerialDisposable,
) {
    if downstream.is_closed() || stages.is_disposed() {
        return;
    }
    let Some(source) = sources.get(index) else {
        downstream.complete();
        stages.dispose();
        return;
    };
    let remaining = Arc::clone(&sources);
    let forward = downstream.clone();
    let successor = stages.clone();
    let subscription = source.subscribe(move |event| match event {
        Event::Next(value) => forward.next(value),
        Event::Error(error) => {
            forward.error(error);
            successor.dispose();
        }
        Event::Completed => subscribe_stage(
            Arc::clone(&remaining),
            index + 1,
            forward.clone(),
            successor.clone(),
        ),
    });
    stages.set(index, subscription);
}

fn schedule_tick(
    scheduler: Arc<dyn Scheduler>,
    period: Duration,
    downstream: Subscriber<u64>,
    ticks: SerialDisposable,
    tick: u64,
) {
    let next_scheduler = Arc::clone(&scheduler);
    let next_ticks = ticks.clone();
    let job = scheduler.schedule_after(
        period,
        Box::new(move || {
            if downstream.is_closed() {
                return;
            }
            downstream.next(tick);
            schedule_tick(next_scheduler, period, downstream, next_ticks, tick + 1);
        }),
    );
    ticks.set(tick as usize, job);
}

//! Effects: lazy, cancellable streams of follow-up actions.

use crate::effects::cancellation::{CancelId, CancellationRegistry};
use crate::effects::disposable::Disposable;
use crate::effects::error::EffectError;
use crate::effects::observable::{Event, Observable, Subscriber};
use crate::effects::scheduler::Scheduler;
use parking_lot::Mutex;
use std::fmt::{self, Display};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// A unit of asynchronous work whose results are actions fed back into a
/// store.
///
/// Effects are lazy: nothing runs until the store subscribes, and every
/// subscription runs the work again.
///
/// # Example
///
/// ```
/// use tka::effects::Effect;
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum Action {
///     Loaded(u32),
/// }
///
/// let load = Effect::future(|| Ok::<_, String>(42)).map(Action::Loaded);
/// assert_eq!(load.into_observable().first_immediate(), Some(Action::Loaded(42)));
/// ```
pub struct Effect<A> {
    observable: Observable<A>,
}

impl<A> Clone for Effect<A> {
    fn clone(&self) -> Self {
        Self {
            observable: self.observable.clone(),
        }
    }
}

impl<A> fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Effect")
    }
}

impl<A: Send + 'static> Effect<A> {
    /// An effect that does nothing and completes immediately.
    pub fn none() -> Self {
        Observable::empty().into()
    }

    /// An effect that fails immediately with `error`.
    pub fn error(error: EffectError) -> Self {
        Observable::fail(error).into()
    }

    /// Run `work` on subscription and emit its result.
    ///
    /// An `Err` or a panic inside `work` becomes an effect error; it never
    /// reaches the store's caller.
    pub fn future<F, E>(work: F) -> Self
    where
        F: Fn() -> Result<A, E> + Send + Sync + 'static,
        E: Display,
    {
        Observable::create(move |subscriber| {
            match catch_unwind(AssertUnwindSafe(&work)) {
                Ok(Ok(action)) => {
                    subscriber.next(action);
                    subscriber.complete();
                }
                Ok(Err(error)) => subscriber.error(EffectError::failed(error)),
                Err(payload) => subscriber.error(EffectError::from_panic(payload)),
            }
            Disposable::empty()
        })
        .into()
    }

    /// Run `work` for its side effect only, then complete.
    pub fn fire_and_forget<F>(work: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Observable::create(move |subscriber| {
            match catch_unwind(AssertUnwindSafe(&work)) {
                Ok(()) => subscriber.complete(),
                Err(payload) => subscriber.error(EffectError::from_panic(payload)),
            }
            Disposable::empty()
        })
        .into()
    }

    /// Run every effect concurrently.
    pub fn merge<I>(effects: I) -> Self
    where
        I: IntoIterator<Item = Effect<A>>,
    {
        Observable::merge(effects.into_iter().map(Effect::into_observable).collect()).into()
    }

    pub fn merge_with(self, other: Effect<A>) -> Self {
        Self::merge([self, other])
    }

    /// Run the effects one after another, each starting once the previous one
    /// completed.
    pub fn concatenate<I>(effects: I) -> Self
    where
        I: IntoIterator<Item = Effect<A>>,
    {
        Observable::concat(effects.into_iter().map(Effect::into_observable).collect()).into()
    }

    pub fn map<B, F>(self, f: F) -> Effect<B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        self.observable.map(f).into()
    }

    pub fn delay(self, delay: Duration, scheduler: impl Scheduler + 'static) -> Self {
        self.observable.delay(delay, Arc::new(scheduler)).into()
    }

    /// Postpone the start of the work itself by `delay`.
    pub fn deferred(self, delay: Duration, scheduler: impl Scheduler + 'static) -> Self {
        self.observable
            .delay_subscription(delay, Arc::new(scheduler))
            .into()
    }

    /// Deliver emitted actions through `scheduler`, typically the thread the
    /// store lives on.
    pub fn receive_on(self, scheduler: impl Scheduler + 'static) -> Self {
        self.observable.receive_on(Arc::new(scheduler)).into()
    }

    /// Start the work on `scheduler`.
    pub fn subscribe_on(self, scheduler: impl Scheduler + 'static) -> Self {
        self.observable.subscribe_on(Arc::new(scheduler)).into()
    }

    /// An effect that cancels every running effect registered under `id`.
    pub fn cancel(registry: &CancellationRegistry, id: impl Into<CancelId>) -> Self {
        let registry = registry.clone();
        let id = id.into();
        Self::fire_and_forget(move || registry.cancel(&id))
    }

    pub fn cancel_all<I>(registry: &CancellationRegistry, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<CancelId>,
    {
        let registry = registry.clone();
        let ids: Vec<CancelId> = ids.into_iter().map(Into::into).collect();
        Self::fire_and_forget(move || {
            for id in &ids {
                registry.cancel(id);
            }
        })
    }

    /// Make this effect cancellable through `registry` under `id`.
    ///
    /// With `cancel_in_flight`, effects already running under `id` are
    /// cancelled before this one starts. A cancelled effect completes; it
    /// never errors. Actions the work emits before the store has finished
    /// subscribing are held back and replayed in order.
    pub fn cancellable(
        self,
        registry: &CancellationRegistry,
        id: impl Into<CancelId>,
        cancel_in_flight: bool,
    ) -> Self {
        let id = id.into();
        let cancellable = Self::from(relay(self.observable, registry.clone(), id.clone()));
        if cancel_in_flight {
            Self::concatenate([Self::cancel(registry, id), cancellable])
        } else {
            cancellable
        }
    }

    pub fn into_observable(self) -> Observable<A> {
        self.observable
    }

    pub fn as_observable(&self) -> &Observable<A> {
        &self.observable
    }
}

impl<A: Clone + Send + Sync + 'static> Effect<A> {
    /// Emit `action` and complete.
    pub fn just(action: A) -> Self {
        Observable::just(action).into()
    }
}

impl Effect<u64> {
    /// Emit a tick count every `period` until cancelled.
    pub fn interval(period: Duration, scheduler: impl Scheduler + 'static) -> Self {
        Observable::interval(period, Arc::new(scheduler)).into()
    }
}

impl<A> From<Observable<A>> for Effect<A> {
    fn from(observable: Observable<A>) -> Self {
        Self { observable }
    }
}

enum Relay<A> {
    Buffering(Vec<Event<A>>),
    Live {
        downstream: Subscriber<A>,
        cancel: Disposable,
    },
}

fn relay<A: Send + 'static>(
    source: Observable<A>,
    registry: CancellationRegistry,
    id: CancelId,
) -> Observable<A> {
    Observable::create(move |downstream: Subscriber<A>| {
        let state = Arc::new(Mutex::new(Relay::Buffering(Vec::new())));
        let sink = Arc::clone(&state);
        let upstream = source.subscribe(move |event| {
            let (live, cancel) = {
                let mut state = sink.lock();
                match &mut *state {
                    Relay::Buffering(buffer) => {
                        buffer.push(event);
                        return;
                    }
                    Relay::Live { downstream, cancel } => (downstream.clone(), cancel.clone()),
                }
            };
            deliver(&live, &cancel, event);
        });

        let token = registry.next_token();
        let cancel = {
            let downstream = downstream.clone();
            let registry = registry.clone();
            let id = id.clone();
            Disposable::new(move || {
                downstream.complete();
                upstream.dispose();
                registry.remove(&id, token);
            })
        };
        registry.insert(id.clone(), token, cancel.clone());

        // Replay in batches; events arriving meanwhile keep buffering until
        // the buffer is observed empty.
        loop {
            let batch = {
                let mut state = state.lock();
                match &mut *state {
                    Relay::Buffering(buffer) if buffer.is_empty() => {
                        *state = Relay::Live {
                            downstream: downstream.clone(),
                            cancel: cancel.clone(),
                        };
                        break;
                    }
                    Relay::Buffering(buffer) => std::mem::take(buffer),
                    Relay::Live { .. } => break,
                }
            };
            for event in batch {
                deliver(&downstream, &cancel, event);
            }
        }

        cancel
    })
}

fn deliver<A>(downstream: &Subscriber<A>, cancel: &Disposable, event: Event<A>) {
    let terminal = event.is_terminal();
    downstream.on(event);
    if terminal {
        cancel.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::scheduler::TestScheduler;

    fn record<A: Send + 'static>(effect: &Effect<A>) -> (Arc<Mutex<Vec<Event<A>>>>, Disposable) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = effect
            .as_observable()
            .subscribe(move |event| sink.lock().push(event));
        (events, subscription)
    }

    #[test]
    fn none_completes_without_actions() {
        let (events, _) = record(&Effect::<i32>::none());
        assert_eq!(*events.lock(), vec![Event::Completed]);
    }

    #[test]
    fn future_error_becomes_effect_error() {
        let effect = Effect::<i32>::future(|| Err("offline"));

        let (events, _) = record(&effect);

        assert_eq!(
            *events.lock(),
            vec![Event::Error(EffectError::Failed("offline".into()))]
        );
    }

    #[test]
    fn future_panic_is_caught() {
        let effect = Effect::<i32>::future(|| -> Result<i32, String> { panic!("bad input") });

        let (events, _) = record(&effect);

        assert_eq!(
            *events.lock(),
            vec![Event::Error(EffectError::Panicked("bad input".into()))]
        );
    }

    #[test]
    fn fire_and_forget_runs_work_per_subscription() {
        let runs = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&runs);
        let effect = Effect::<i32>::fire_and_forget(move || *counter.lock() += 1);

        record(&effect);
        let (events, _) = record(&effect);

        assert_eq!(*runs.lock(), 2);
        assert_eq!(*events.lock(), vec![Event::Completed]);
    }

    #[test]
    fn concatenate_keeps_order() {
        let scheduler = TestScheduler::new();
        let effect = Effect::concatenate([
            Effect::just(1).delay(Duration::from_secs(1), scheduler.clone()),
            Effect::just(2),
        ]);

        let (events, _) = record(&effect);
        scheduler.advance_by(Duration::from_secs(1));

        assert_eq!(
            *events.lock(),
            vec![Event::Next(1), Event::Next(2), Event::Completed]
        );
    }

    #[test]
    fn cancellable_replays_synchronous_values() {
        let registry = CancellationRegistry::new();
        let effect = Effect::concatenate([Effect::just(1), Effect::just(2)]).cancellable(
            &registry,
            "sync",
            false,
        );

        let (events, _) = record(&effect);

        assert_eq!(
            *events.lock(),
            vec![Event::Next(1), Event::Next(2), Event::Completed]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn cancel_completes_running_effect() {
        let scheduler = TestScheduler::new();
        let registry = CancellationRegistry::new();
        let effect = Effect::just(1)
            .delay(Duration::from_secs(1), scheduler.clone())
            .cancellable(&registry, "timer", false);

        let (events, _) = record(&effect);
        assert!(registry.contains(&CancelId::from("timer")));

        record(&Effect::<i32>::cancel(&registry, "timer"));
        scheduler.advance_by(Duration::from_secs(1));

        assert_eq!(*events.lock(), vec![Event::Completed]);
        assert!(registry.is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancel_in_flight_replaces_previous_run() {
        let scheduler = TestScheduler::new();
        let registry = CancellationRegistry::new();
        let make = |value: i32| {
            Effect::just(value)
                .delay(Duration::from_secs(1), scheduler.clone())
                .cancellable(&registry, "search", true)
        };

        let (first, _) = record(&make(1));
        let (second, _) = record(&make(2));
        scheduler.advance_by(Duration::from_secs(1));

        assert_eq!(*first.lock(), vec![Event::Completed]);
        assert_eq!(*second.lock(), vec![Event::Next(2), Event::Completed]);
        assert!(registry.is_empty());
    }

    #[test]
    fn disposing_downstream_unregisters() {
        let registry = CancellationRegistry::new();
        let effect = Effect::<i32>::from(Observable::never()).cancellable(&registry, 9_u64, false);

        let (_, subscription) = record(&effect);
        assert_eq!(registry.running(&CancelId::from(9_u64)), 1);

        subscription.dispose();
        assert!(registry.is_empty());
    }

    #[test]
    fn cancel_unknown_id_is_noop() {
        let registry = CancellationRegistry::new();
        let (events, _) = record(&Effect::<i32>::cancel_all(&registry, ["a", "b"]));
        assert_eq!(*events.lock(), vec![Event::Completed]);
    }
}

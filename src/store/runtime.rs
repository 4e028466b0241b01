//! The store runtime: serialized reduction and effect bookkeeping.

use crate::core::{Reduced, Reducer};
use crate::effects::{BehaviorSubject, Disposable, Effect, Event, Observable};
use crate::store::config::{DrainPolicy, ReentrancyCheck, StoreConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

type ReduceFn<S, A> = Box<dyn Fn(S, A) -> Reduced<S, A> + Send + Sync>;

const REENTRANT_SEND: &str = "send was called from inside a reducer of the same store. \
    Reducers must stay pure: return an effect that emits the follow-up action instead";

/// Pending actions and the drain flags guarding them.
struct ActionQueue<A> {
    /// Emitted by an effect while it was being subscribed.
    synchronous: VecDeque<A>,
    /// Sent while another action was being processed.
    buffered: VecDeque<A>,
    draining: bool,
    reducing_on: Option<ThreadId>,
}

impl<A> Default for ActionQueue<A> {
    fn default() -> Self {
        Self {
            synchronous: VecDeque::new(),
            buffered: VecDeque::new(),
            draining: false,
            reducing_on: None,
        }
    }
}

impl<A> ActionQueue<A> {
    fn pop(&mut self) -> Option<A> {
        match self.synchronous.pop_front() {
            Some(action) => Some(action),
            None => self.buffered.pop_front(),
        }
    }
}

struct EffectPhase {
    synchronous: AtomicBool,
    completed: AtomicBool,
}

pub(crate) struct StoreInner<S, A> {
    reduce: ReduceFn<S, A>,
    state: BehaviorSubject<S>,
    queue: Mutex<ActionQueue<A>>,
    effects: Mutex<HashMap<u64, Disposable>>,
    next_effect: AtomicU64,
    links: Mutex<Vec<Disposable>>,
    disposed: AtomicBool,
    config: StoreConfig,
    checks_reentrancy: bool,
}

impl<S, A> Drop for StoreInner<S, A> {
    fn drop(&mut self) {
        for (_, subscription) in self.effects.get_mut().drain() {
            subscription.dispose();
        }
        for link in self.links.get_mut().drain(..) {
            link.dispose();
        }
    }
}

/// Owns a state value and runs every action through a reducer.
///
/// `send` reduces the action, publishes the new state, then subscribes to the
/// returned effect. Actions arriving while the store is already processing
/// are queued and handled by the running drain loop, so reductions never
/// nest. Effect emissions produced while the effect is being subscribed are
/// handled before any other queued action (see [`DrainPolicy`]); later
/// emissions come back through `send`.
///
/// The handle is cheap to clone; clones share the same state.
///
/// # Example
///
/// ```rust
/// use tka::core::{Reduced, Reducer};
/// use tka::store::Store;
///
/// #[derive(Clone, Debug, PartialEq)]
/// enum Action {
///     Increment,
///     Decrement,
/// }
///
/// let reducer = Reducer::new(|count: i32, action: Action, _: &()| match action {
///     Action::Increment => Reduced::none(count + 1),
///     Action::Decrement => Reduced::none(count - 1),
/// });
///
/// let store = Store::new(0, reducer, ());
/// store.send(Action::Increment);
/// store.send(Action::Increment);
/// store.send(Action::Decrement);
/// assert_eq!(store.current_state(), 1);
/// ```
pub struct Store<S, A> {
    pub(crate) inner: Arc<StoreInner<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: fmt::Debug, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.inner.config.name())
            .field("state", &self.inner.state)
            .field("effects", &self.inner.effects.lock().len())
            .finish()
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    pub fn new<E>(initial: S, reducer: Reducer<S, A, E>, environment: E) -> Self
    where
        E: Send + Sync + 'static,
    {
        Self::with_config(initial, reducer, environment, StoreConfig::default())
    }

    pub fn with_config<E>(
        initial: S,
        reducer: Reducer<S, A, E>,
        environment: E,
        config: StoreConfig,
    ) -> Self
    where
        E: Send + Sync + 'static,
    {
        Self::from_fn(initial, config, true, move |state, action| {
            reducer.reduce(state, action, &environment)
        })
    }

    pub(crate) fn from_fn<F>(initial: S, config: StoreConfig, checks_reentrancy: bool, reduce: F) -> Self
    where
        F: Fn(S, A) -> Reduced<S, A> + Send + Sync + 'static,
    {
        tracing::trace!(store = config.name(), "store created");
        Self {
            inner: Arc::new(StoreInner {
                reduce: Box::new(reduce),
                state: BehaviorSubject::new(initial),
                queue: Mutex::new(ActionQueue::default()),
                effects: Mutex::new(HashMap::new()),
                next_effect: AtomicU64::new(0),
                links: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
                config,
                checks_reentrancy,
            }),
        }
    }

    /// Process `action`, and everything it leads to, before returning.
    ///
    /// If the store is already processing, the action is queued and this
    /// returns at once; the running drain loop picks it up.
    ///
    /// # Panics
    ///
    /// Under [`ReentrancyCheck::Panic`], when called from inside this store's
    /// own reducer.
    pub fn send(&self, action: A) {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::Acquire) {
            tracing::warn!(store = inner.config.name(), "action sent to a disposed store was dropped");
            return;
        }
        {
            let mut queue = inner.queue.lock();
            if inner.checks_reentrancy && queue.reducing_on == Some(thread::current().id()) {
                match inner.config.reentrancy {
                    ReentrancyCheck::Panic => {
                        drop(queue);
                        panic!("{REENTRANT_SEND}");
                    }
                    ReentrancyCheck::Warn => {
                        tracing::warn!(store = inner.config.name(), "{REENTRANT_SEND}")
                    }
                    ReentrancyCheck::Ignore => {}
                }
            }
            queue.buffered.push_back(action);
            if queue.draining {
                return;
            }
            queue.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        let inner = &self.inner;
        // A panicking reducer leaves the store idle so later sends still run.
        let _reset = scopeguard::guard_on_unwind((), |_| {
            let mut queue = inner.queue.lock();
            queue.draining = false;
            queue.reducing_on = None;
        });

        loop {
            let action = {
                let mut queue = inner.queue.lock();
                match queue.pop() {
                    Some(action) => {
                        queue.reducing_on = Some(thread::current().id());
                        action
                    }
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            tracing::trace!(store = inner.config.name(), "reducing action");
            let (state, effect) = (inner.reduce)(inner.state.value(), action).into_parts();
            inner.queue.lock().reducing_on = None;

            inner.state.next(state);
            self.subscribe_effect(effect);
        }
    }

    fn subscribe_effect(&self, effect: Effect<A>) {
        let inner = &self.inner;
        let id = inner.next_effect.fetch_add(1, Ordering::Relaxed);
        let phase = Arc::new(EffectPhase {
            synchronous: AtomicBool::new(true),
            completed: AtomicBool::new(false),
        });
        let store: Weak<StoreInner<S, A>> = Arc::downgrade(&self.inner);
        let owner = thread::current().id();
        let observed = Arc::clone(&phase);

        tracing::trace!(store = inner.config.name(), effect = id, "subscribing effect");
        let subscription = effect.into_observable().subscribe(move |event| {
            let Some(inner) = store.upgrade() else {
                return;
            };
            let store = Store { inner };
            match event {
                Event::Next(action) => {
                    if observed.synchronous.load(Ordering::Acquire) && thread::current().id() == owner {
                        store.enqueue_synchronous(action);
                    } else {
                        store.send(action);
                    }
                }
                Event::Error(error) => {
                    tracing::error!(store = store.inner.config.name(), effect = id, %error, "effect failed");
                    store.finish_effect(id, &observed);
                }
                Event::Completed => {
                    tracing::debug!(store = store.inner.config.name(), effect = id, "effect completed");
                    store.finish_effect(id, &observed);
                }
            }
        });
        phase.synchronous.store(false, Ordering::Release);

        let mut effects = inner.effects.lock();
        if phase.completed.load(Ordering::Acquire) {
            drop(effects);
            subscription.dispose();
        } else {
            effects.insert(id, subscription);
        }
    }

    fn enqueue_synchronous(&self, action: A) {
        let mut queue = self.inner.queue.lock();
        match self.inner.config.drain_policy {
            DrainPolicy::SynchronousFirst => queue.synchronous.push_back(action),
            DrainPolicy::Fifo => queue.buffered.push_back(action),
        }
    }

    fn finish_effect(&self, id: u64, phase: &EffectPhase) {
        phase.completed.store(true, Ordering::Release);
        let finished = self.inner.effects.lock().remove(&id);
        drop(finished);
    }

    /// Stream of states, starting with the current one.
    pub fn state(&self) -> Observable<S> {
        self.inner.state.observable()
    }

    pub fn current_state(&self) -> S {
        self.inner.state.value()
    }

    /// Dispose every running effect, regardless of cancellation id.
    ///
    /// Later sends are dropped with a warning. Calling this twice is harmless.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let effects: Vec<Disposable> = self.inner.effects.lock().drain().map(|(_, d)| d).collect();
        let links: Vec<Disposable> = self.inner.links.lock().drain(..).collect();
        tracing::debug!(
            store = self.inner.config.name(),
            effects = effects.len(),
            "store disposed"
        );
        for disposable in effects.into_iter().chain(links) {
            disposable.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Number of effect subscriptions that have not finished yet.
    pub fn active_effects(&self) -> usize {
        self.inner.effects.lock().len()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Keep `link` alive for as long as this store, and dispose it with the store.
    pub(crate) fn attach(&self, link: Disposable) {
        if self.is_disposed() {
            link.dispose();
            return;
        }
        self.inner.links.lock().push(link);
    }

    pub(crate) fn state_subject(&self) -> &BehaviorSubject<S> {
        &self.inner.state
    }
}

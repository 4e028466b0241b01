//! Hot multicast sources.

use crate::effects::disposable::Disposable;
use crate::effects::error::EffectError;
use crate::effects::observable::{Event, Observable, Subscriber};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct Subscribers<T> {
    next_id: u64,
    live: Vec<(u64, Subscriber<T>)>,
    terminal: Option<Event<T>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            live: Vec::new(),
            terminal: None,
        }
    }
}

impl<T> Subscribers<T> {
    fn register(&mut self, subscriber: Subscriber<T>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.live.push((id, subscriber));
        id
    }

    fn snapshot(&self) -> Vec<Subscriber<T>> {
        self.live.iter().map(|(_, s)| s.clone()).collect()
    }
}

fn unregister<T: Send + 'static>(state: &Arc<Mutex<Subscribers<T>>>, id: u64) -> Disposable {
    let state = Arc::downgrade(state);
    Disposable::new(move || {
        if let Some(state) = state.upgrade() {
            state.lock().live.retain(|(live, _)| *live != id);
        }
    })
}

fn finish<T: Clone>(state: &Mutex<Subscribers<T>>, event: Event<T>) {
    let live = {
        let mut state = state.lock();
        if state.terminal.is_some() {
            return;
        }
        state.terminal = Some(event.clone());
        std::mem::take(&mut state.live)
    };
    for (_, subscriber) in live {
        subscriber.on(event.clone());
    }
}

/// Broadcasts values to whoever is subscribed at the time of emission.
pub struct PublishSubject<T> {
    state: Arc<Mutex<Subscribers<T>>>,
}

impl<T> Clone for PublishSubject<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for PublishSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> PublishSubject<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(Subscribers::default())),
        }
    }

    pub fn next(&self, value: T) {
        let live = {
            let state = self.state.lock();
            if state.terminal.is_some() {
                return;
            }
            state.snapshot()
        };
        for subscriber in live {
            subscriber.next(value.clone());
        }
    }

    pub fn error(&self, error: EffectError) {
        finish(&self.state, Event::Error(error));
    }

    pub fn complete(&self) {
        finish(&self.state, Event::Completed);
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn observable(&self) -> Observable<T> {
        let state = Arc::clone(&self.state);
        Observable::create(move |subscriber| {
            let mut guard = state.lock();
            if let Some(terminal) = guard.terminal.clone() {
                drop(guard);
                subscriber.on(terminal);
                return Disposable::empty();
            }
            let id = guard.register(subscriber.clone());
            drop(guard);
            unregister(&state, id)
        })
    }
}

impl<T> fmt::Debug for PublishSubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishSubject")
            .field("subscribers", &self.state.lock().live.len())
            .finish()
    }
}

/// Holds a current value and replays it to every new subscriber.
pub struct BehaviorSubject<T> {
    value: Arc<Mutex<T>>,
    state: Arc<Mutex<Subscribers<T>>>,
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> BehaviorSubject<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: Arc::new(Mutex::new(initial)),
            state: Arc::new(Mutex::new(Subscribers::default())),
        }
    }

    /// The most recently published value.
    pub fn value(&self) -> T {
        self.value.lock().clone()
    }

    pub fn next(&self, value: T) {
        let live = {
            let state = self.state.lock();
            if state.terminal.is_some() {
                return;
            }
            *self.value.lock() = value.clone();
            state.snapshot()
        };
        for subscriber in live {
            subscriber.next(value.clone());
        }
    }

    pub fn error(&self, error: EffectError) {
        finish(&self.state, Event::Error(error));
    }

    pub fn complete(&self) {
        finish(&self.state, Event::Completed);
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Stream of values, starting with the current one.
    pub fn observable(&self) -> Observable<T> {
        let value = Arc::clone(&self.value);
        let state = Arc::clone(&self.state);
        Observable::create(move |subscriber| {
            // Registration and the replayed value are read together so no
            // publication falls between them.
            let (current, registration) = {
                let mut guard = state.lock();
                if let Some(terminal) = guard.terminal.clone() {
                    drop(guard);
                    subscriber.on(terminal);
                    return Disposable::empty();
                }
                let current = value.lock().clone();
                (current, guard.register(subscriber.clone()))
            };
            subscriber.next(current);
            unregister(&state, registration)
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for BehaviorSubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorSubject")
            .field("value", &*self.value.lock())
            .field("subscribers", &self.state.lock().live.len())
            .finish()
    }
}

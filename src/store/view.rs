//! Deduplicating observers for presentation code.

use crate::effects::{Disposable, Event, Observable};
use crate::store::runtime::Store;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Observes a store's state without repeats and sends actions to it.
///
/// `states` skips any state the duplicate check considers equal to the one
/// before it. The view keeps its own copy of the latest state, so
/// `current_state` never touches the store's queue.
///
/// ```rust
/// use tka::core::{Reduced, Reducer};
/// use tka::store::Store;
///
/// let store = Store::new(0, Reducer::new(|n: i32, by: i32, _: &()| Reduced::none(n + by)), ());
/// let view = store.view();
///
/// view.send(0);
/// view.send(2);
/// assert_eq!(view.current_state(), 2);
/// ```
pub struct ViewStore<S, A> {
    store: Store<S, A>,
    current: Arc<Mutex<S>>,
    states: Observable<S>,
    subscription: Disposable,
}

impl<S, A> ViewStore<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    pub fn new(store: Store<S, A>) -> Self
    where
        S: PartialEq,
    {
        Self::with_duplicates(store, |a: &S, b: &S| a == b)
    }

    /// Use `is_duplicate` instead of `PartialEq` to drop repeated states.
    pub fn with_duplicates<F>(store: Store<S, A>, is_duplicate: F) -> Self
    where
        F: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        let states = store.state().distinct_until_changed_by(is_duplicate);
        let current = Arc::new(Mutex::new(store.current_state()));
        let sink = Arc::clone(&current);
        let subscription = states.subscribe(move |event| {
            if let Event::Next(state) = event {
                *sink.lock() = state;
            }
        });
        Self {
            store,
            current,
            states,
            subscription,
        }
    }

    pub fn current_state(&self) -> S {
        self.current.lock().clone()
    }

    pub fn states(&self) -> Observable<S> {
        self.states.clone()
    }

    pub fn send(&self, action: A) {
        self.store.send(action);
    }

    /// Stop tracking the store. Also happens on drop.
    pub fn dispose(&self) {
        self.subscription.dispose();
    }
}

impl<S, A> Drop for ViewStore<S, A> {
    fn drop(&mut self) {
        self.subscription.dispose();
    }
}

impl<S: fmt::Debug, A> fmt::Debug for ViewStore<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewStore")
            .field("current", &*self.current.lock())
            .finish()
    }
}

/// A [`ViewStore`] over optional state whose `states` only carry present
/// values.
pub struct OptionalViewStore<S, A> {
    store: Store<Option<S>, A>,
    current: Arc<Mutex<Option<S>>>,
    states: Observable<S>,
    subscription: Disposable,
}

impl<S, A> OptionalViewStore<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    pub fn new(store: Store<Option<S>, A>) -> Self
    where
        S: PartialEq,
    {
        Self::with_duplicates(store, |a: &S, b: &S| a == b)
    }

    pub fn with_duplicates<F>(store: Store<Option<S>, A>, is_duplicate: F) -> Self
    where
        F: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        let states = store
            .state()
            .filter_map(|state: Option<S>| state)
            .distinct_until_changed_by(is_duplicate);
        let current = Arc::new(Mutex::new(store.current_state()));
        let sink = Arc::clone(&current);
        let subscription = store.state().subscribe(move |event| {
            if let Event::Next(state) = event {
                *sink.lock() = state;
            }
        });
        Self {
            store,
            current,
            states,
            subscription,
        }
    }

    /// The latest state, `None` while it is absent.
    pub fn current_state(&self) -> Option<S> {
        self.current.lock().clone()
    }

    pub fn states(&self) -> Observable<S> {
        self.states.clone()
    }

    pub fn send(&self, action: A) {
        self.store.send(action);
    }

    pub fn dispose(&self) {
        self.subscription.dispose();
    }
}

impl<S, A> Drop for OptionalViewStore<S, A> {
    fn drop(&mut self) {
        self.subscription.dispose();
    }
}

impl<S: fmt::Debug, A> fmt::Debug for OptionalViewStore<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionalViewStore")
            .field("current", &*self.current.lock())
            .finish()
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    pub fn view(&self) -> ViewStore<S, A>
    where
        S: PartialEq,
    {
        ViewStore::new(self.clone())
    }

    pub fn view_with<F>(&self, is_duplicate: F) -> ViewStore<S, A>
    where
        F: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        ViewStore::with_duplicates(self.clone(), is_duplicate)
    }
}

impl<S, A> Store<Option<S>, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    pub fn optional_view(&self) -> OptionalViewStore<S, A>
    where
        S: PartialEq,
    {
        OptionalViewStore::new(self.clone())
    }

    pub fn optional_view_with<F>(&self, is_duplicate: F) -> OptionalViewStore<S, A>
    where
        F: Fn(&S, &S) -> bool + Send + Sync + 'static,
    {
        OptionalViewStore::with_duplicates(self.clone(), is_duplicate)
    }
}

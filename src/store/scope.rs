//! Deriving child stores that focus on part of a parent's domain.
//!
//! A scoped store never reduces on its own. Its actions are embedded into
//! parent actions and sent upward; its state is the parent's state seen
//! through a projection, refreshed after each of its own sends and whenever
//! the parent publishes.

use crate::core::Reduced;
use crate::effects::{CompositeDisposable, Disposable, Event, Observable};
use crate::store::runtime::Store;
use std::convert::Infallible;
use std::sync::Arc;

type Extract<S, L> = Arc<dyn Fn(&S) -> Option<L> + Send + Sync>;
type Embed<L, A> = Arc<dyn Fn(L) -> A + Send + Sync>;

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Derive a store over a local view of this store's domain.
    ///
    /// ```rust
    /// use tka::core::{Reduced, Reducer};
    /// use tka::store::Store;
    ///
    /// #[derive(Clone, Debug, PartialEq)]
    /// struct App {
    ///     count: i32,
    ///     title: &'static str,
    /// }
    ///
    /// #[derive(Clone, Debug)]
    /// enum AppAction {
    ///     Counter(i32),
    /// }
    ///
    /// let store = Store::new(
    ///     App { count: 0, title: "demo" },
    ///     Reducer::new(|app: App, action: AppAction, _: &()| match action {
    ///         AppAction::Counter(by) => Reduced::none(App { count: app.count + by, ..app }),
    ///     }),
    ///     (),
    /// );
    ///
    /// let counter = store.scope(|app: &App| app.count, AppAction::Counter);
    /// counter.send(2);
    ///
    /// assert_eq!(counter.current_state(), 2);
    /// assert_eq!(store.current_state().count, 2);
    /// ```
    pub fn scope<LS, LA, ToLocal, FromLocal>(&self, to_local: ToLocal, from_local: FromLocal) -> Store<LS, LA>
    where
        LS: Clone + Send + Sync + 'static,
        LA: Send + 'static,
        ToLocal: Fn(&S) -> LS + Send + Sync + 'static,
        FromLocal: Fn(LA) -> A + Send + Sync + 'static,
    {
        let initial = to_local(&self.current_state());
        self.child(
            initial,
            Arc::new(move |state: &S| Some(to_local(state))),
            Arc::new(from_local),
        )
    }

    /// [`scope`](Self::scope) that keeps the action type.
    pub fn scope_state<LS, ToLocal>(&self, to_local: ToLocal) -> Store<LS, A>
    where
        LS: Clone + Send + Sync + 'static,
        ToLocal: Fn(&S) -> LS + Send + Sync + 'static,
    {
        self.scope(to_local, |action: A| action)
    }

    /// Scope to a part of the state that may be absent.
    ///
    /// The child's state stays an `Option`, so observers can tell "absent"
    /// apart from any present value. Pair with [`if_let`](Store::if_let).
    pub fn optional<LS, LA, ToLocal, FromLocal>(
        &self,
        to_local: ToLocal,
        from_local: FromLocal,
    ) -> Store<Option<LS>, LA>
    where
        LS: Clone + Send + Sync + 'static,
        LA: Send + 'static,
        ToLocal: Fn(&S) -> Option<LS> + Send + Sync + 'static,
        FromLocal: Fn(LA) -> A + Send + Sync + 'static,
    {
        self.scope(to_local, from_local)
    }

    /// A store that can send actions but exposes no state.
    pub fn stateless(&self) -> Store<(), A> {
        self.scope(|_: &S| (), |action: A| action)
    }

    /// A store that exposes state but accepts no actions.
    pub fn actionless(&self) -> Store<S, Infallible> {
        self.scope(S::clone, |never: Infallible| match never {})
    }

    /// Derive a new child store for every value of a transformed state stream.
    ///
    /// `to_local` turns the parent's state stream into a stream of local
    /// states; each value it emits becomes the initial state of a fresh child.
    /// A child keeps following the parent as long as `to_local` still yields
    /// a value for the parent's state, and keeps its last state otherwise.
    pub fn scopes<LS, LA, ToLocal, FromLocal>(
        &self,
        to_local: ToLocal,
        from_local: FromLocal,
    ) -> Observable<Store<LS, LA>>
    where
        LS: Clone + Send + Sync + 'static,
        LA: Send + 'static,
        ToLocal: Fn(Observable<S>) -> Observable<LS> + Send + Sync + 'static,
        FromLocal: Fn(LA) -> A + Send + Sync + 'static,
    {
        let to_local = Arc::new(to_local);
        let from_local: Embed<LA, A> = Arc::new(from_local);
        let project = Arc::clone(&to_local);
        let extract: Extract<S, LS> =
            Arc::new(move |state: &S| project(Observable::just(state.clone())).first_immediate());
        let parent = self.clone();
        to_local(self.state())
            .map(move |local: LS| parent.child(local, Arc::clone(&extract), Arc::clone(&from_local)))
    }

    fn child<LS, LA>(&self, initial: LS, extract: Extract<S, LS>, from_local: Embed<LA, A>) -> Store<LS, LA>
    where
        LS: Clone + Send + Sync + 'static,
        LA: Send + 'static,
    {
        let parent = self.clone();
        let project = Arc::clone(&extract);
        let child = Store::from_fn(initial, self.config().clone(), false, move |state: LS, action: LA| {
            parent.send(from_local(action));
            Reduced::none(project(&parent.current_state()).unwrap_or(state))
        });

        let mirror = child.state_subject().clone();
        let link = self
            .state()
            .filter_map(move |state: S| extract(&state))
            .subscribe(move |event| {
                if let Event::Next(local) = event {
                    mirror.next(local);
                }
            });
        child.attach(link);
        child
    }
}

impl<S, A> Store<Option<S>, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Follow the presence of the optional state.
    ///
    /// `unwrap` receives a store over the present state every time the state
    /// goes from absent to present; `or_else` runs every time it goes from
    /// present to absent, and once up front if it starts absent. Dispose the
    /// result to stop following.
    pub fn if_let<U, E>(&self, unwrap: U, or_else: E) -> Disposable
    where
        U: Fn(Store<S, A>) + Send + Sync + 'static,
        E: Fn() + Send + Sync + 'static,
    {
        let presence = |states: Observable<Option<S>>| {
            states.distinct_until_changed_by(|a: &Option<S>, b: &Option<S>| a.is_some() == b.is_some())
        };

        let absent = self
            .scopes(presence, |action: A| action)
            .subscribe(move |event| {
                if let Event::Next(store) = event {
                    if store.current_state().is_none() {
                        or_else();
                    }
                }
            });

        let present = self
            .scopes(
                move |states| presence(states).filter_map(|state: Option<S>| state),
                |action: A| action,
            )
            .subscribe(move |event| {
                if let Event::Next(store) = event {
                    unwrap(store);
                }
            });

        let both = CompositeDisposable::new();
        both.add(absent);
        both.add(present);
        both.into_disposable()
    }

    /// [`if_let`](Self::if_let) without an absent branch.
    pub fn if_some<U>(&self, unwrap: U) -> Disposable
    where
        U: Fn(Store<S, A>) + Send + Sync + 'static,
    {
        self.if_let(unwrap, || {})
    }
}

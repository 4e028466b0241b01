//! Reducers: pure state transitions returning follow-up effects.

use crate::core::optics::{ActionPrism, Getter, StateLens};
use crate::effects::Effect;
use std::fmt;
use std::sync::Arc;

/// The outcome of reducing one action: the next state and the effect to run.
///
/// Every reduction yields exactly one state and exactly one effect, which may
/// be [`Effect::none`].
pub struct Reduced<S, A> {
    pub state: S,
    pub effect: Effect<A>,
}

impl<S, A: Send + 'static> Reduced<S, A> {
    pub fn new(state: S, effect: Effect<A>) -> Self {
        Self { state, effect }
    }

    /// The next state with nothing left to do.
    pub fn none(state: S) -> Self {
        Self::new(state, Effect::none())
    }

    pub fn into_parts(self) -> (S, Effect<A>) {
        (self.state, self.effect)
    }
}

impl<S: fmt::Debug, A> fmt::Debug for Reduced<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reduced")
            .field("state", &self.state)
            .field("effect", &self.effect)
            .finish()
    }
}

type ReduceFn<S, A, E> = Arc<dyn Fn(S, A, &E) -> Reduced<S, A> + Send + Sync>;

/// A pure function from `(state, action, environment)` to [`Reduced`].
///
/// Reducers are cheap to clone and compose: [`pullback`](Self::pullback)
/// lifts a local reducer into a larger domain, [`combine`](Self::combine)
/// runs several reducers over the same action.
///
/// # Example
///
/// ```rust
/// use tka::core::{Reduced, Reducer};
///
/// #[derive(Clone, Debug, PartialEq)]
/// enum Action {
///     Increment,
///     Decrement,
/// }
///
/// let counter = Reducer::new(|count: i32, action: Action, _env: &()| match action {
///     Action::Increment => Reduced::none(count + 1),
///     Action::Decrement => Reduced::none(count - 1),
/// });
///
/// let reduced = counter.reduce(0, Action::Increment, &());
/// assert_eq!(reduced.state, 1);
/// ```
pub struct Reducer<S, A, E> {
    reduce: ReduceFn<S, A, E>,
}

impl<S, A, E> Clone for Reducer<S, A, E> {
    fn clone(&self) -> Self {
        Self {
            reduce: Arc::clone(&self.reduce),
        }
    }
}

impl<S, A, E> fmt::Debug for Reducer<S, A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reducer")
    }
}

impl<S: 'static, A: Send + 'static, E: 'static> Reducer<S, A, E> {
    pub fn new<F>(reduce: F) -> Self
    where
        F: Fn(S, A, &E) -> Reduced<S, A> + Send + Sync + 'static,
    {
        Self {
            reduce: Arc::new(reduce),
        }
    }

    /// A reducer that leaves the state untouched.
    pub fn empty() -> Self {
        Self::new(|state, _, _| Reduced::none(state))
    }

    pub fn reduce(&self, state: S, action: A, environment: &E) -> Reduced<S, A> {
        (self.reduce)(state, action, environment)
    }

    /// Lift this reducer into a global domain.
    ///
    /// Global actions the prism does not match leave the global state
    /// unchanged with no effect. Matched actions reduce the lens-focused
    /// local state against the derived environment; local effects are
    /// embedded back into global actions.
    ///
    /// ```rust
    /// use tka::core::{ActionPrism, Getter, Reduced, Reducer, StateLens};
    ///
    /// #[derive(Clone, Debug, PartialEq)]
    /// struct App {
    ///     left: i32,
    ///     right: i32,
    /// }
    ///
    /// #[derive(Clone, Debug, PartialEq)]
    /// enum AppAction {
    ///     Left(i32),
    ///     Right(i32),
    /// }
    ///
    /// let add = Reducer::new(|n: i32, delta: i32, _: &()| Reduced::none(n + delta));
    /// let left = add.pullback(
    ///     StateLens::new(|app: &App| app.left, |app: App, left| App { left, ..app }),
    ///     ActionPrism::new(
    ///         |action: &AppAction| match action {
    ///             AppAction::Left(delta) => Some(*delta),
    ///             _ => None,
    ///         },
    ///         AppAction::Left,
    ///     ),
    ///     Getter::identity(),
    /// );
    ///
    /// let app = App { left: 0, right: 0 };
    /// let app = left.reduce(app, AppAction::Left(2), &()).state;
    /// let app = left.reduce(app, AppAction::Right(5), &()).state;
    /// assert_eq!(app, App { left: 2, right: 0 });
    /// ```
    pub fn pullback<GS, GA, GE>(
        &self,
        state: StateLens<GS, S>,
        action: ActionPrism<GA, A>,
        environment: Getter<GE, E>,
    ) -> Reducer<GS, GA, GE>
    where
        GS: 'static,
        GA: Send + 'static,
        GE: 'static,
    {
        let local = self.clone();
        Reducer::new(move |global: GS, global_action: GA, global_env: &GE| {
            let Some(local_action) = action.get(&global_action) else {
                return Reduced::none(global);
            };
            let local_env = environment.get(global_env);
            let (local_state, effect) = local
                .reduce(state.get(&global), local_action, &local_env)
                .into_parts();
            let embed = action.clone();
            Reduced::new(
                state.set(global, local_state),
                effect.map(move |local| embed.reverse_get(local)),
            )
        })
    }

    /// Lift this reducer to a state that may be absent.
    ///
    /// Reducing while the state is `None` is a programming error: the usual
    /// causes are an action sent after the parent cleared the state, an
    /// effect outliving the state it belongs to, or a parent reducer that
    /// runs before this one and clears the state. Debug builds panic;
    /// release builds log the error and leave the state as it is.
    pub fn optional(&self) -> Reducer<Option<S>, A, E> {
        let inner = self.clone();
        Reducer::new(move |state: Option<S>, action: A, environment: &E| match state {
            Some(state) => {
                let (state, effect) = inner.reduce(state, action, environment).into_parts();
                Reduced::new(Some(state), effect)
            }
            None => {
                if cfg!(debug_assertions) {
                    panic!("{ABSENT_STATE}");
                }
                tracing::error!("{ABSENT_STATE}");
                Reduced::none(None)
            }
        })
    }
}

const ABSENT_STATE: &str = "an optional reducer received an action while its state was absent. \
    Check that no action is sent after the parent clears this state, that long-running effects \
    are cancelled when the state is cleared, and that this reducer is combined before any \
    parent reducer that clears it";

impl<S: 'static, A: Clone + Send + 'static, E: 'static> Reducer<S, A, E> {
    /// Run every reducer on the same action, in order.
    ///
    /// Each reducer sees the state produced by the previous one, and the
    /// resulting effects run concurrently. Order matters: a parent reducer
    /// that clears state placed before a child reducer that needs it will
    /// trip [`optional`](Self::optional).
    pub fn combine<I>(reducers: I) -> Self
    where
        I: IntoIterator<Item = Reducer<S, A, E>>,
    {
        let reducers: Vec<Reducer<S, A, E>> = reducers.into_iter().collect();
        Self::new(move |state, action, environment| {
            let mut effects = Vec::with_capacity(reducers.len());
            let state = reducers.iter().fold(state, |state, reducer| {
                let (state, effect) = reducer
                    .reduce(state, action.clone(), environment)
                    .into_parts();
                effects.push(effect);
                state
            });
            Reduced::new(state, Effect::merge(effects))
        })
    }

    pub fn combined_with(&self, other: Reducer<S, A, E>) -> Self {
        Self::combine([self.clone(), other])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Event;
    use parking_lot::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    enum Action {
        Add(i32),
        Double,
        Echo(i32),
    }

    fn arithmetic() -> Reducer<i32, Action, ()> {
        Reducer::new(|n, action, _| match action {
            Action::Add(k) => Reduced::none(n + k),
            Action::Double => Reduced::none(n * 2),
            Action::Echo(k) => Reduced::new(n, Effect::just(Action::Add(k))),
        })
    }

    fn emitted<A: Send + 'static>(effect: Effect<A>) -> Vec<A> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        effect.into_observable().subscribe(move |event| {
            if let Event::Next(action) = event {
                sink.lock().push(action);
            }
        });
        let values = std::mem::take(&mut *seen.lock());
        values
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Pair {
        first: i32,
        second: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum PairAction {
        First(Action),
        Second(Action),
    }

    fn first_lens() -> StateLens<Pair, i32> {
        StateLens::new(|p: &Pair| p.first, |p: Pair, first| Pair { first, ..p })
    }

    fn first_prism() -> ActionPrism<PairAction, Action> {
        ActionPrism::new(
            |a: &PairAction| match a {
                PairAction::First(action) => Some(action.clone()),
                PairAction::Second(_) => None,
            },
            PairAction::First,
        )
    }

    #[test]
    fn empty_reducer_keeps_state() {
        let reduced = Reducer::<i32, Action, ()>::empty().reduce(3, Action::Double, &());
        assert_eq!(reduced.state, 3);
        assert!(emitted(reduced.effect).is_empty());
    }

    #[test]
    fn combine_threads_state_through_reducers() {
        let combined = Reducer::combine([arithmetic(), arithmetic()]);

        let reduced = combined.reduce(1, Action::Double, &());

        assert_eq!(reduced.state, 4);
    }

    #[test]
    fn combine_merges_effects() {
        let combined = arithmetic().combined_with(arithmetic());

        let reduced = combined.reduce(0, Action::Echo(5), &());

        assert_eq!(emitted(reduced.effect), vec![Action::Add(5), Action::Add(5)]);
    }

    #[test]
    fn pullback_ignores_foreign_actions() {
        let reducer = arithmetic().pullback(first_lens(), first_prism(), Getter::identity());
        let pair = Pair { first: 1, second: 1 };

        let reduced = reducer.reduce(pair.clone(), PairAction::Second(Action::Add(3)), &());

        assert_eq!(reduced.state, pair);
        assert!(emitted(reduced.effect).is_empty());
    }

    #[test]
    fn pullback_embeds_local_effects() {
        let reducer = arithmetic().pullback(first_lens(), first_prism(), Getter::identity());
        let pair = Pair { first: 1, second: 1 };

        let reduced = reducer.reduce(pair, PairAction::First(Action::Echo(2)), &());

        assert_eq!(reduced.state, Pair { first: 1, second: 1 });
        assert_eq!(
            emitted(reduced.effect),
            vec![PairAction::First(Action::Add(2))]
        );
    }

    #[test]
    fn pullback_uses_derived_environment() {
        let scaled = Reducer::new(|n: i32, action: Action, factor: &i32| match action {
            Action::Add(k) => Reduced::none(n + k * factor),
            _ => Reduced::none(n),
        });
        let reducer = scaled.pullback(
            first_lens(),
            first_prism(),
            Getter::new(|env: &(i32, &'static str)| env.0),
        );

        let reduced = reducer.reduce(
            Pair { first: 0, second: 0 },
            PairAction::First(Action::Add(2)),
            &(10, "unused"),
        );

        assert_eq!(reduced.state.first, 20);
    }

    #[test]
    fn optional_reduces_present_state() {
        let reduced = arithmetic().optional().reduce(Some(2), Action::Add(1), &());
        assert_eq!(reduced.state, Some(3));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "state was absent")]
    fn optional_panics_on_absent_state() {
        arithmetic().optional().reduce(None, Action::Add(1), &());
    }
}

//! Optics used to embed a local domain inside a global one.
//!
//! A [`StateLens`] focuses on a part of the global state, an [`ActionPrism`]
//! picks out the global actions that belong to a local feature, and a
//! [`Getter`] derives a local environment from the global one. All three are
//! plain pairs of functions; composing them builds deeper focus.

use std::fmt;
use std::sync::Arc;

/// Read and replace a local part `L` of a global value `G`.
///
/// A lawful lens satisfies `lens.get(&lens.set(g, l)) == l`.
///
/// # Example
///
/// ```rust
/// use tka::core::StateLens;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct App {
///     count: i32,
///     title: String,
/// }
///
/// let count = StateLens::new(
///     |app: &App| app.count,
///     |app: App, count| App { count, ..app },
/// );
///
/// let app = App { count: 1, title: "demo".into() };
/// assert_eq!(count.get(&app), 1);
/// assert_eq!(count.set(app.clone(), 5).count, 5);
/// assert_eq!(count.modify(app, |n| n + 1).count, 2);
/// ```
pub struct StateLens<G, L> {
    get: Arc<dyn Fn(&G) -> L + Send + Sync>,
    set: Arc<dyn Fn(G, L) -> G + Send + Sync>,
}

impl<G, L> Clone for StateLens<G, L> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<G: 'static, L: 'static> StateLens<G, L> {
    pub fn new<Get, Set>(get: Get, set: Set) -> Self
    where
        Get: Fn(&G) -> L + Send + Sync + 'static,
        Set: Fn(G, L) -> G + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    pub fn get(&self, global: &G) -> L {
        (self.get)(global)
    }

    pub fn set(&self, global: G, local: L) -> G {
        (self.set)(global, local)
    }

    pub fn modify(&self, global: G, f: impl FnOnce(L) -> L) -> G {
        let local = self.get(&global);
        self.set(global, f(local))
    }

    /// Focus further into `L` with `inner`.
    pub fn compose<M: 'static>(&self, inner: StateLens<L, M>) -> StateLens<G, M> {
        let outer_get = self.clone();
        let outer_set = self.clone();
        let inner_get = inner.clone();
        StateLens::new(
            move |global: &G| inner_get.get(&outer_get.get(global)),
            move |global: G, value: M| {
                let local = outer_set.get(&global);
                outer_set.set(global, inner.set(local, value))
            },
        )
    }
}

impl<G: Clone + 'static> StateLens<G, G> {
    pub fn identity() -> Self {
        Self::new(G::clone, |_, local| local)
    }
}

impl<G, L> fmt::Debug for StateLens<G, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StateLens")
    }
}

/// Match a global action `G` against a local action `L` and embed local
/// actions back into the global type.
///
/// A lawful prism satisfies `prism.get(&prism.reverse_get(l)) == Some(l)`.
/// A global action the prism does not match is simply not local.
///
/// # Example
///
/// ```rust
/// use tka::core::ActionPrism;
///
/// #[derive(Clone, Debug, PartialEq)]
/// enum AppAction {
///     Counter(i32),
///     Reset,
/// }
///
/// let counter = ActionPrism::new(
///     |action: &AppAction| match action {
///         AppAction::Counter(delta) => Some(*delta),
///         _ => None,
///     },
///     AppAction::Counter,
/// );
///
/// assert_eq!(counter.get(&AppAction::Counter(3)), Some(3));
/// assert_eq!(counter.get(&AppAction::Reset), None);
/// assert_eq!(counter.reverse_get(3), AppAction::Counter(3));
/// ```
pub struct ActionPrism<G, L> {
    get: Arc<dyn Fn(&G) -> Option<L> + Send + Sync>,
    reverse_get: Arc<dyn Fn(L) -> G + Send + Sync>,
}

impl<G, L> Clone for ActionPrism<G, L> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            reverse_get: Arc::clone(&self.reverse_get),
        }
    }
}

impl<G: 'static, L: 'static> ActionPrism<G, L> {
    pub fn new<Get, Reverse>(get: Get, reverse_get: Reverse) -> Self
    where
        Get: Fn(&G) -> Option<L> + Send + Sync + 'static,
        Reverse: Fn(L) -> G + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            reverse_get: Arc::new(reverse_get),
        }
    }

    pub fn get(&self, global: &G) -> Option<L> {
        (self.get)(global)
    }

    pub fn reverse_get(&self, local: L) -> G {
        (self.reverse_get)(local)
    }

    pub fn compose<M: 'static>(&self, inner: ActionPrism<L, M>) -> ActionPrism<G, M> {
        let outer_get = self.clone();
        let outer_reverse = self.clone();
        let inner_get = inner.clone();
        ActionPrism::new(
            move |global: &G| outer_get.get(global).and_then(|local| inner_get.get(&local)),
            move |value: M| outer_reverse.reverse_get(inner.reverse_get(value)),
        )
    }
}

impl<G: Clone + 'static> ActionPrism<G, G> {
    pub fn identity() -> Self {
        Self::new(|action: &G| Some(action.clone()), |action| action)
    }
}

impl<G, L> fmt::Debug for ActionPrism<G, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionPrism")
    }
}

/// Derive a `B` from an `A`; used to hand a local environment to a pulled
/// back reducer.
pub struct Getter<A, B> {
    get: Arc<dyn Fn(&A) -> B + Send + Sync>,
}

impl<A, B> Clone for Getter<A, B> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
        }
    }
}

impl<A: 'static, B: 'static> Getter<A, B> {
    pub fn new<F>(get: F) -> Self
    where
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        Self { get: Arc::new(get) }
    }

    pub fn get(&self, value: &A) -> B {
        (self.get)(value)
    }
}

impl<A: Clone + 'static> Getter<A, A> {
    pub fn identity() -> Self {
        Self::new(A::clone)
    }
}

impl<A, B> fmt::Debug for Getter<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Getter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Outer {
        inner: Inner,
        label: &'static str,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Inner {
        value: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Global {
        Local(Local),
        Other,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Local {
        Step(i32),
        Stop,
    }

    fn inner_lens() -> StateLens<Outer, Inner> {
        StateLens::new(|o: &Outer| o.inner.clone(), |o: Outer, inner| Outer { inner, ..o })
    }

    fn value_lens() -> StateLens<Inner, i32> {
        StateLens::new(|i: &Inner| i.value, |_: Inner, value| Inner { value })
    }

    fn local_prism() -> ActionPrism<Global, Local> {
        ActionPrism::new(
            |g: &Global| match g {
                Global::Local(local) => Some(local.clone()),
                Global::Other => None,
            },
            Global::Local,
        )
    }

    fn step_prism() -> ActionPrism<Local, i32> {
        ActionPrism::new(
            |l: &Local| match l {
                Local::Step(n) => Some(*n),
                Local::Stop => None,
            },
            Local::Step,
        )
    }

    #[test]
    fn composed_lens_reaches_nested_field() {
        let lens = inner_lens().compose(value_lens());
        let outer = Outer {
            inner: Inner { value: 1 },
            label: "x",
        };

        assert_eq!(lens.get(&outer), 1);

        let updated = lens.set(outer, 9);
        assert_eq!(updated.inner.value, 9);
        assert_eq!(updated.label, "x");
    }

    #[test]
    fn composed_prism_filters_both_levels() {
        let prism = local_prism().compose(step_prism());

        assert_eq!(prism.get(&Global::Local(Local::Step(4))), Some(4));
        assert_eq!(prism.get(&Global::Local(Local::Stop)), None);
        assert_eq!(prism.get(&Global::Other), None);
        assert_eq!(prism.reverse_get(4), Global::Local(Local::Step(4)));
    }

    #[test]
    fn identities_are_transparent() {
        let outer = Outer {
            inner: Inner { value: 3 },
            label: "id",
        };

        assert_eq!(StateLens::identity().get(&outer), outer);
        assert_eq!(ActionPrism::identity().get(&Local::Stop), Some(Local::Stop));
        assert_eq!(Getter::identity().get(&7), 7);
    }

    #[test]
    fn getter_derives_value() {
        let getter = Getter::new(|o: &Outer| o.label.len());
        let outer = Outer {
            inner: Inner { value: 0 },
            label: "four",
        };
        assert_eq!(getter.get(&outer), 4);
    }
}

//! Builder for stores and test stores.

use crate::builder::error::BuildError;
use crate::core::Reducer;
use crate::store::{DrainPolicy, ReentrancyCheck, Store, StoreConfig};
use crate::testing::TestStore;
use std::fmt::Debug;

/// Builder for a [`Store`] with a fluent API.
///
/// ```rust
/// use tka::builder::StoreBuilder;
/// use tka::core::{Reduced, Reducer};
///
/// let store = StoreBuilder::new()
///     .initial(0)
///     .reducer(Reducer::new(|n: i32, by: i32, _: &()| Reduced::none(n + by)))
///     .environment(())
///     .label("adder")
///     .build()
///     .unwrap();
///
/// store.send(3);
/// assert_eq!(store.current_state(), 3);
/// assert_eq!(store.config().label.as_deref(), Some("adder"));
/// ```
pub struct StoreBuilder<S, A, E> {
    initial: Option<S>,
    reducer: Option<Reducer<S, A, E>>,
    environment: Option<E>,
    config: StoreConfig,
}

impl<S, A, E> StoreBuilder<S, A, E>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            initial: None,
            reducer: None,
            environment: None,
            config: StoreConfig::default(),
        }
    }

    /// Set the initial state (required).
    pub fn initial(mut self, state: S) -> Self {
        self.initial = Some(state);
        self
    }

    /// Set the reducer (required), replacing any set before.
    pub fn reducer(mut self, reducer: Reducer<S, A, E>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    /// Set the environment (required).
    pub fn environment(mut self, environment: E) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the configuration with one parsed from JSON.
    pub fn config_json(mut self, json: &str) -> Result<Self, BuildError> {
        self.config = StoreConfig::from_json(json)?;
        Ok(self)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config = self.config.with_label(label);
        self
    }

    pub fn drain_policy(mut self, policy: DrainPolicy) -> Self {
        self.config = self.config.with_drain_policy(policy);
        self
    }

    pub fn reentrancy(mut self, check: ReentrancyCheck) -> Self {
        self.config = self.config.with_reentrancy(check);
        self
    }

    fn parts(self) -> Result<(S, Reducer<S, A, E>, E, StoreConfig), BuildError> {
        let initial = self.initial.ok_or(BuildError::MissingInitialState)?;
        let reducer = self.reducer.ok_or(BuildError::MissingReducer)?;
        let environment = self.environment.ok_or(BuildError::MissingEnvironment)?;
        Ok((initial, reducer, environment, self.config))
    }

    /// Build the store.
    /// Returns an error if a required part is missing.
    pub fn build(self) -> Result<Store<S, A>, BuildError> {
        let (initial, reducer, environment, config) = self.parts()?;
        Ok(Store::with_config(initial, reducer, environment, config))
    }
}

impl<S, A, E> StoreBuilder<S, A, E>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Add a reducer that runs after the ones already added.
    pub fn combine(mut self, reducer: Reducer<S, A, E>) -> Self {
        self.reducer = Some(match self.reducer.take() {
            Some(existing) => existing.combined_with(reducer),
            None => reducer,
        });
        self
    }
}

impl<S, A, E> StoreBuilder<S, A, E>
where
    S: Clone + PartialEq + Debug + Send + Sync + 'static,
    A: Clone + PartialEq + Debug + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Build a [`TestStore`] from the same parts.
    ///
    /// The configuration is ignored: test stores always drain synchronous
    /// effect output first.
    pub fn build_test(self) -> Result<TestStore<S, A, E>, BuildError> {
        let (initial, reducer, environment, _) = self.parts()?;
        Ok(TestStore::new(initial, reducer, environment))
    }
}

impl<S, A, E> Default for StoreBuilder<S, A, E>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

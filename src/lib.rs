//! TKA: a unidirectional Store/Reducer/Effect runtime
//!
//! Application logic lives in pure [`Reducer`]s that turn
//! `(state, action, environment)` into a new state and an [`Effect`]
//! describing follow-up work. A [`Store`] owns the state, runs every action
//! through the reducer one at a time, and feeds effect output back in.
//!
//! # Core Concepts
//!
//! - **Reducer**: pure transition function, composed with
//!   [`pullback`](Reducer::pullback) and [`combine`](Reducer::combine)
//! - **Effect**: lazy, cancellable stream of actions
//! - **Store**: serializes actions and runs effects; [`scope`](Store::scope)
//!   derives child stores for sub-features
//! - **TestStore**: exhaustive harness asserting every state change and
//!   every effect
//!
//! # Example
//!
//! ```rust
//! use tka::{Effect, Reduced, Reducer, Store};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum Action {
//!     Increment,
//!     Decrement,
//!     Reset,
//! }
//!
//! let counter = Reducer::new(|count: i32, action, _env: &()| match action {
//!     Action::Increment => Reduced::none(count + 1),
//!     Action::Decrement => Reduced::none(count - 1),
//!     Action::Reset => Reduced::new(count, Effect::just(Action::Decrement)),
//! });
//!
//! let store = Store::new(0, counter, ());
//! store.send(Action::Increment);
//! store.send(Action::Increment);
//! store.send(Action::Reset);
//! assert_eq!(store.current_state(), 1);
//! ```

pub mod builder;
pub mod core;
pub mod effects;
pub mod store;
pub mod testing;

// Re-export commonly used types
pub use builder::{BuildError, StoreBuilder};
pub use core::{ActionPrism, Getter, Reduced, Reducer, StateLens};
pub use effects::{CancelId, CancellationRegistry, Effect, EffectError};
pub use store::{Store, StoreConfig, ViewStore};
pub use testing::{Step, TestStore};

//! Fluent construction of stores.
//!
//! [`StoreBuilder`] collects the initial state, reducers, environment and
//! [`StoreConfig`](crate::store::StoreConfig) for a store and validates them
//! in one place. Several reducers are combined in the order they were added.

pub mod error;
pub mod store;

pub use error::BuildError;
pub use store::StoreBuilder;

//! The runtime that owns state and runs effects.
//!
//! A [`Store`] serializes every action through its reducer, publishes each
//! new state, and feeds effect output back in. Scoped stores
//! ([`Store::scope`] and friends) expose a slice of a parent's domain, and a
//! [`ViewStore`] gives presentation code a deduplicated view of the state.

mod config;
mod runtime;
mod scope;
mod view;

pub use config::{ConfigError, DrainPolicy, ReentrancyCheck, StoreConfig};
pub use runtime::Store;
pub use view::{OptionalViewStore, ViewStore};

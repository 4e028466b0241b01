//! Exhaustive testing of reducers and their effects.
//!
//! [`TestStore`] drives a reducer the way a [`Store`](crate::store::Store)
//! does and fails unless the test accounts for every state change, every
//! action fed back by an effect and every effect still running.

mod diff;
mod failure;
mod step;
mod test_store;

pub use diff::{debug_diff, line_diff};
pub use failure::{StepLabel, TestStoreFailure};
pub use step::Step;
pub use test_store::TestStore;

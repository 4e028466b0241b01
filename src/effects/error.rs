//! Errors raised inside effects.

use std::any::Any;
use std::fmt::Display;

/// An error produced by an effect's work.
///
/// Effect errors never reach the reducer: the store logs them and drops the
/// failed effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    #[error("effect failed: {0}")]
    Failed(String),

    #[error("effect panicked: {0}")]
    Panicked(String),
}

impl EffectError {
    pub fn failed(reason: impl Display) -> Self {
        Self::Failed(reason.to_string())
    }

    /// Describe a payload caught by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(panic_message(payload.as_ref()))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

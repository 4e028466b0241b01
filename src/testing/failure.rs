//! Assertion failures reported by [`TestStore`](crate::testing::TestStore).

use std::fmt;
use thiserror::Error;

/// Position of an assertion inside a step script, if it came from one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepLabel(pub Option<usize>);

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(step) => write!(f, " on step {step}"),
            None => Ok(()),
        }
    }
}

/// A broken expectation. Actions and states are carried in their `Debug`
/// form so failures can be compared and printed without the domain types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestStoreFailure {
    #[error("Must handle {count} received action(s) before sending an action{step}\nUnhandled actions: {actions}")]
    UnhandledBeforeSend {
        step: StepLabel,
        count: usize,
        actions: String,
    },

    #[error("Expected to receive {expected}{step}, but received none")]
    NothingReceived { step: StepLabel, expected: String },

    #[error("Received unexpected action{step}\n    Expected: {expected}\n    Actual:   {actual}")]
    UnexpectedAction {
        step: StepLabel,
        expected: String,
        actual: String,
    },

    #[error("State change{step} does not match expectation (expected: -, actual: +)\n{diff}")]
    StateMismatch {
        step: StepLabel,
        expected: String,
        actual: String,
        diff: String,
    },

    #[error("Received {count} unexpected action(s)\nUnhandled actions: {actions}")]
    UnhandledActions { count: usize, actions: String },

    #[error(
        "{count} effect(s) still running. All effects must complete by the end of the assertion.\n\
         * If an effect uses a scheduler, advance the test scheduler far enough for it to finish.\n\
         * Long-living effects (timers, subscriptions) must be cancelled by an action sent in the test."
    )]
    EffectsStillRunning { count: usize },
}

impl TestStoreFailure {
    /// Failures that can only be found at the end of a script.
    pub fn is_exhaustiveness(&self) -> bool {
        matches!(
            self,
            TestStoreFailure::UnhandledActions { .. } | TestStoreFailure::EffectsStillRunning { .. }
        )
    }
}

//! Diagnostic decorators for reducers.

use crate::core::reducer::{Reduced, Reducer};
use crate::effects::panic_message;
use std::fmt::Debug;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// What a debugging reducer reports for every action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugFormat {
    /// The action with the state before and after it.
    #[default]
    StateAndAction,
    /// Only the action.
    ActionsOnly,
}

type Sink = Arc<dyn Fn(&str) + Send + Sync>;

impl<S, A, E> Reducer<S, A, E>
where
    S: Debug + 'static,
    A: Debug + Send + 'static,
    E: 'static,
{
    /// Log every action with the state before and after it at `DEBUG`.
    pub fn debug(&self, prefix: impl Into<String>) -> Self {
        self.debug_with(prefix, DebugFormat::StateAndAction, log_debug)
    }

    /// Log every action at `DEBUG`, without state.
    pub fn debug_actions(&self, prefix: impl Into<String>) -> Self {
        self.debug_with(prefix, DebugFormat::ActionsOnly, log_debug)
    }

    /// Report every action to `sink`.
    ///
    /// The decorated reducer behaves exactly like this one. If it panics the
    /// failure is reported and the panic resumed.
    ///
    /// ```rust
    /// use tka::core::{DebugFormat, Reduced, Reducer};
    /// use std::sync::{Arc, Mutex};
    ///
    /// let lines = Arc::new(Mutex::new(Vec::new()));
    /// let sink = Arc::clone(&lines);
    /// let counter = Reducer::new(|n: i32, by: i32, _: &()| Reduced::none(n + by))
    ///     .debug_with("counter", DebugFormat::ActionsOnly, move |line| {
    ///         sink.lock().unwrap().push(line.to_string())
    ///     });
    ///
    /// assert_eq!(counter.reduce(1, 2, &()).state, 3);
    /// assert_eq!(lines.lock().unwrap()[0], "counter: received action 2");
    /// ```
    pub fn debug_with<F>(&self, prefix: impl Into<String>, format: DebugFormat, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let inner = self.clone();
        let prefix = prefix.into();
        let sink: Sink = Arc::new(sink);
        Reducer::new(move |state: S, action: A, environment: &E| {
            let received = format!("{action:?}");
            let before = match format {
                DebugFormat::StateAndAction => Some(format!("{state:#?}")),
                DebugFormat::ActionsOnly => None,
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                inner.reduce(state, action, environment)
            }));
            match outcome {
                Ok(reduced) => {
                    sink(&describe(&prefix, &received, before.as_deref(), &reduced));
                    reduced
                }
                Err(payload) => {
                    sink(&format!(
                        "{prefix}: reducer panicked on action {received}: {}",
                        panic_message(payload.as_ref())
                    ));
                    resume_unwind(payload)
                }
            }
        })
    }
}

fn describe<S: Debug, A>(prefix: &str, action: &str, before: Option<&str>, reduced: &Reduced<S, A>) -> String {
    match before {
        Some(before) => format!(
            "{prefix}: received action {action}\nstate:\n{before}\nreduced to:\n{:#?}",
            reduced.state
        ),
        None => format!("{prefix}: received action {action}"),
    }
}

fn log_debug(line: &str) {
    tracing::debug!(target: "tka::debug", "{line}");
}

impl<S: 'static, A: Send + 'static, E: 'static> Reducer<S, A, E> {
    /// Assert that every reduction happens on `expected`.
    ///
    /// Stores are single-threaded: actions from effects running elsewhere
    /// must be delivered back with `receive_on` before they reach `send`.
    pub fn verify_thread(&self, expected: ThreadId) -> Self {
        let inner = self.clone();
        Reducer::new(move |state, action, environment| {
            let current = thread::current().id();
            assert_eq!(
                current, expected,
                "reducer ran on {current:?} but the store lives on {expected:?}; \
                 deliver effect output with receive_on before it reaches send"
            );
            inner.reduce(state, action, environment)
        })
    }

    /// [`verify_thread`](Self::verify_thread) for the calling thread.
    pub fn verify_current_thread(&self) -> Self {
        self.verify_thread(thread::current().id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Effect;
    use parking_lot::Mutex;

    fn recorded(format: DebugFormat) -> (Arc<Mutex<Vec<String>>>, Reducer<i32, i32, ()>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let reducer = Reducer::new(|n: i32, by: i32, _: &()| {
            if by < 0 {
                panic!("negative step");
            }
            Reduced::new(n + by, Effect::none())
        })
        .debug_with("math", format, move |line| sink.lock().push(line.to_string()));
        (lines, reducer)
    }

    #[test]
    fn logs_state_before_and_after() {
        let (lines, reducer) = recorded(DebugFormat::StateAndAction);

        assert_eq!(reducer.reduce(1, 2, &()).state, 3);

        assert_eq!(
            lines.lock().as_slice(),
            ["math: received action 2\nstate:\n1\nreduced to:\n3"]
        );
    }

    #[test]
    fn panic_is_reported_and_resumed() {
        let (lines, reducer) = recorded(DebugFormat::ActionsOnly);

        let outcome = catch_unwind(AssertUnwindSafe(|| reducer.reduce(0, -1, &())));

        assert!(outcome.is_err());
        assert_eq!(
            lines.lock().as_slice(),
            ["math: reducer panicked on action -1: negative step"]
        );
    }

    #[test]
    fn default_sink_does_not_change_behaviour() {
        let reducer = Reducer::new(|n: i32, by: i32, _: &()| Reduced::none(n * by)).debug("mul");
        assert_eq!(reducer.reduce(3, 4, &()).state, 12);
    }

    #[test]
    fn verify_thread_accepts_owner() {
        let reducer =
            Reducer::new(|n: i32, by: i32, _: &()| Reduced::none(n + by)).verify_current_thread();
        assert_eq!(reducer.reduce(1, 1, &()).state, 2);
    }

    #[test]
    fn verify_thread_rejects_other_threads() {
        let reducer =
            Reducer::new(|n: i32, by: i32, _: &()| Reduced::none(n + by)).verify_current_thread();

        let result = std::thread::spawn(move || reducer.reduce(1, 1, &()).state).join();

        assert!(result.is_err());
    }
}

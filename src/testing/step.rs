//! Scripted test steps.

use std::fmt;

type Update<LS> = Box<dyn FnOnce(&mut LS)>;

pub(crate) enum StepKind<A, E, LS, LA> {
    Send { action: LA, update: Update<LS> },
    Receive { action: A, update: Update<LS> },
    Environment(Box<dyn FnOnce(&mut E)>),
    Do(Box<dyn FnOnce()>),
}

/// One entry of a script run by
/// [`TestStore::assert_steps`](crate::testing::TestStore::assert_steps).
///
/// Failures name the step by its 1-based position in the script.
pub struct Step<A, E, LS, LA> {
    pub(crate) kind: StepKind<A, E, LS, LA>,
}

impl<A, E, LS, LA> Step<A, E, LS, LA> {
    /// Send `action` and expect the state to change as `update` describes.
    pub fn send(action: LA, update: impl FnOnce(&mut LS) + 'static) -> Self {
        Self {
            kind: StepKind::Send {
                action,
                update: Box::new(update),
            },
        }
    }

    /// Expect an effect to have fed `action` back, changing the state as
    /// `update` describes.
    pub fn receive(action: A, update: impl FnOnce(&mut LS) + 'static) -> Self {
        Self {
            kind: StepKind::Receive {
                action,
                update: Box::new(update),
            },
        }
    }

    /// Change the environment between assertions.
    pub fn environment(work: impl FnOnce(&mut E) + 'static) -> Self {
        Self {
            kind: StepKind::Environment(Box::new(work)),
        }
    }

    /// Run arbitrary work between assertions, such as advancing a scheduler.
    pub fn do_work(work: impl FnOnce() + 'static) -> Self {
        Self {
            kind: StepKind::Do(Box::new(work)),
        }
    }
}

impl<A: fmt::Debug, E, LS, LA: fmt::Debug> fmt::Debug for Step<A, E, LS, LA> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StepKind::Send { action, .. } => f.debug_tuple("Send").field(action).finish(),
            StepKind::Receive { action, .. } => f.debug_tuple("Receive").field(action).finish(),
            StepKind::Environment(_) => f.write_str("Environment"),
            StepKind::Do(_) => f.write_str("Do"),
        }
    }
}

//! The effect runtime: the impure shell around reducers.
//!
//! Reducers stay pure by returning an [`Effect`] describing follow-up work.
//! Everything that actually runs that work lives here:
//!
//! - [`Observable`] and the subjects: a small push-based stream primitive
//! - [`Scheduler`] implementations deciding where and when work runs
//! - [`Effect`] constructors and combinators
//! - [`CancellationRegistry`] tracking cancellable effects by [`CancelId`]
//!
//! Effects are lazy and may be subscribed more than once; each subscription
//! runs the work again.

mod cancellation;
mod disposable;
mod effect;
mod error;
mod observable;
mod scheduler;
mod subject;
mod task;

pub use cancellation::{CancelId, CancellationRegistry};
pub use disposable::{CompositeDisposable, Disposable, SerialDisposable};
pub use effect::Effect;
pub use error::EffectError;
pub use observable::{Event, Observable, Subscriber};
pub use scheduler::{ImmediateScheduler, Job, QueueScheduler, Scheduler, TestScheduler, TokioScheduler};
pub use subject::{BehaviorSubject, PublishSubject};

pub(crate) use error::panic_message;

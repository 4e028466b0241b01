//! The pure core: reducers and the optics that compose them.
//!
//! Nothing in this module performs side effects. A [`Reducer`] only
//! *describes* follow-up work by returning an [`Effect`](crate::effects::Effect);
//! the [`Store`](crate::store::Store) is what runs it.

mod debug;
mod optics;
mod reducer;

pub use debug::DebugFormat;
pub use optics::{ActionPrism, Getter, StateLens};
pub use reducer::{Reduced, Reducer};

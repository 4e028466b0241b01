//! Handles for tearing down subscriptions.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type DisposeAction = Box<dyn FnOnce() + Send>;

/// A handle that tears down a subscription exactly once.
///
/// Cloning shares the handle: disposing any clone disposes all of them.
#[derive(Clone)]
pub struct Disposable {
    inner: Arc<DisposableInner>,
}

struct DisposableInner {
    disposed: AtomicBool,
    action: Mutex<Option<DisposeAction>>,
}

impl Disposable {
    /// Create a disposable running `action` on first disposal.
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: Arc::new(DisposableInner {
                disposed: AtomicBool::new(false),
                action: Mutex::new(Some(Box::new(action))),
            }),
        }
    }

    /// A disposable with nothing to tear down.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(DisposableInner {
                disposed: AtomicBool::new(false),
                action: Mutex::new(None),
            }),
        }
    }

    /// Dispose, running the teardown action if this is the first call.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Taken out of the lock so teardown may re-enter this handle.
        let action = self.inner.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A bag of disposables torn down together.
///
/// Adding to an already disposed composite disposes the new item immediately.
#[derive(Clone, Default)]
pub struct CompositeDisposable {
    state: Arc<Mutex<CompositeState>>,
}

#[derive(Default)]
struct CompositeState {
    disposed: bool,
    items: Vec<Disposable>,
}

impl CompositeDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, disposable: Disposable) {
        let mut state = self.state.lock();
        if state.disposed {
            drop(state);
            disposable.dispose();
            return;
        }
        state.items.retain(|item| !item.is_disposed());
        state.items.push(disposable);
    }

    pub fn dispose(&self) {
        let items = {
            let mut state = self.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.items)
        };
        for item in items {
            item.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Number of live items, mostly useful in tests.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .items
            .iter()
            .filter(|item| !item.is_disposed())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wrap the composite in a single [`Disposable`].
    pub fn into_disposable(self) -> Disposable {
        Disposable::new(move || self.dispose())
    }
}

impl fmt::Debug for CompositeDisposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CompositeDisposable")
            .field("disposed", &state.disposed)
            .field("items", &state.items.len())
            .finish()
    }
}

/// Holds the disposable of the current stage in a sequence of subscriptions.
///
/// Stages are numbered; a stage only replaces the held disposable when it is
/// newer than the one already held. A stage that completes synchronously can
/// therefore start its successor before its own disposable is recorded.
#[derive(Clone, Default)]
pub struct SerialDisposable {
    state: Arc<Mutex<SerialState>>,
}

#[derive(Default)]
struct SerialState {
    disposed: bool,
    stage: usize,
    current: Option<Disposable>,
}

impl SerialDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the disposable for `stage`.
    pub fn set(&self, stage: usize, disposable: Disposable) {
        let mut state = self.state.lock();
        if state.disposed {
            drop(state);
            disposable.dispose();
            return;
        }
        if state.current.is_none() || stage >= state.stage {
            state.stage = stage;
            state.current = Some(disposable);
        }
    }

    pub fn dispose(&self) {
        let current = {
            let mut state = self.state.lock();
            state.disposed = true;
            state.current.take()
        };
        if let Some(current) = current {
            current.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub fn into_disposable(self) -> Disposable {
        Disposable::new(move || self.dispose())
    }
}

impl fmt::Debug for SerialDisposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SerialDisposable")
            .field("disposed", &state.disposed)
            .field("stage", &state.stage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (Arc<AtomicUsize>, Disposable) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let disposable = Disposable::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (count, disposable)
    }

    #[test]
    fn dispose_runs_action_once() {
        let (count, disposable) = counting();
        let clone = disposable.clone();

        disposable.dispose();
        clone.dispose();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(clone.is_disposed());
    }

    #[test]
    fn composite_disposes_late_additions() {
        let composite = CompositeDisposable::new();
        let (first, a) = counting();
        composite.add(a);
        composite.dispose();

        let (second, b) = counting();
        composite.add(b);

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert!(composite.is_empty());
    }

    #[test]
    fn serial_keeps_newest_stage() {
        let serial = SerialDisposable::new();
        let (newer_count, newer) = counting();
        let (older_count, older) = counting();

        serial.set(1, newer);
        serial.set(0, older);
        serial.dispose();

        assert_eq!(newer_count.load(Ordering::SeqCst), 1);
        assert_eq!(older_count.load(Ordering::SeqCst), 0);
    }
}

//! Cancellation ids and the registry of cancellable subscriptions.

use crate::effects::disposable::Disposable;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

trait CancelKey: Any + fmt::Debug + Send + Sync {
    fn eq_key(&self, other: &dyn CancelKey) -> bool;
    fn hash_key(&self, state: &mut dyn Hasher);
    fn as_any(&self) -> &dyn Any;
}

impl<T> CancelKey for T
where
    T: Any + Eq + Hash + fmt::Debug + Send + Sync,
{
    fn eq_key(&self, other: &dyn CancelKey) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn hash_key(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Identifies a group of cancellable effects.
///
/// Any `Eq + Hash + Debug` value can serve as an id. Two ids are equal only
/// when they hold the same type and equal values, so `CancelId::from("a")`
/// and `CancelId::from(String::from("a"))` are different ids.
///
/// ```
/// use tka::effects::CancelId;
///
/// #[derive(Debug, PartialEq, Eq, Hash)]
/// struct TimerId;
///
/// assert_eq!(CancelId::new(TimerId), CancelId::new(TimerId));
/// assert_ne!(CancelId::from(1_u64), CancelId::from(1_i32));
/// assert_ne!(CancelId::unique(), CancelId::unique());
/// ```
#[derive(Clone)]
pub struct CancelId(Arc<dyn CancelKey>);

impl CancelId {
    pub fn new<T>(key: T) -> Self
    where
        T: Any + Eq + Hash + fmt::Debug + Send + Sync,
    {
        Self(Arc::new(key))
    }

    /// A fresh id that is equal to nothing else.
    pub fn unique() -> Self {
        Self::new(Uuid::new_v4())
    }
}

impl PartialEq for CancelId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref().eq_key(other.0.as_ref())
    }
}

impl Eq for CancelId {}

impl Hash for CancelId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_ref().hash_key(state);
    }
}

impl fmt::Debug for CancelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancelId({:?})", self.0.as_ref())
    }
}

macro_rules! cancel_id_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CancelId {
                fn from(key: $ty) -> Self {
                    Self::new(key)
                }
            }
        )*
    };
}

cancel_id_from!(&'static str, String, u64, u32, i64, i32, usize, Uuid);

/// Live cancellable subscriptions, grouped by [`CancelId`].
///
/// The registry is shared between every effect built against it; cloning
/// shares the same table. An id is present exactly while at least one of its
/// subscriptions is running.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    entries: Mutex<HashMap<CancelId, HashMap<u64, Disposable>>>,
    next_token: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_token(&self) -> u64 {
        self.inner.next_token.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn insert(&self, id: CancelId, token: u64, disposable: Disposable) {
        self.inner
            .entries
            .lock()
            .entry(id)
            .or_default()
            .insert(token, disposable);
    }

    pub(crate) fn remove(&self, id: &CancelId, token: u64) {
        let mut entries = self.inner.entries.lock();
        if let Some(subscriptions) = entries.get_mut(id) {
            subscriptions.remove(&token);
            if subscriptions.is_empty() {
                entries.remove(id);
            }
        }
    }

    /// Dispose every running subscription registered under `id`.
    ///
    /// Cancelling an id with nothing running is a no-op.
    pub fn cancel(&self, id: &CancelId) {
        let subscriptions = self.inner.entries.lock().remove(id);
        let Some(subscriptions) = subscriptions else {
            return;
        };
        tracing::debug!(?id, count = subscriptions.len(), "cancelling effects");
        for disposable in subscriptions.into_values() {
            disposable.dispose();
        }
    }

    pub fn contains(&self, id: &CancelId) -> bool {
        self.inner.entries.lock().contains_key(id)
    }

    /// Number of running subscriptions under `id`.
    pub fn running(&self, id: &CancelId) -> usize {
        self.inner
            .entries
            .lock()
            .get(id)
            .map_or(0, HashMap::len)
    }

    /// Number of ids with running subscriptions.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CancellationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.inner.entries.lock();
        f.debug_map()
            .entries(entries.iter().map(|(id, subs)| (id, subs.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, PartialEq, Eq, Hash)]
    enum Timer {
        Countdown,
        Clock,
    }

    #[test]
    fn ids_compare_by_type_and_value() {
        let ids: HashSet<CancelId> = [
            CancelId::new(Timer::Countdown),
            CancelId::new(Timer::Countdown),
            CancelId::new(Timer::Clock),
            CancelId::from("Clock"),
        ]
        .into_iter()
        .collect();

        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn cancel_disposes_and_forgets() {
        let registry = CancellationRegistry::new();
        let id = CancelId::new(Timer::Clock);
        let disposed = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = Arc::clone(&disposed);
            let token = registry.next_token();
            registry.insert(
                id.clone(),
                token,
                Disposable::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        assert_eq!(registry.running(&id), 2);

        registry.cancel(&id);
        registry.cancel(&id);

        assert_eq!(disposed.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn removing_last_token_drops_id() {
        let registry = CancellationRegistry::new();
        let id = CancelId::from(7_u64);
        let first = registry.next_token();
        let second = registry.next_token();
        registry.insert(id.clone(), first, Disposable::empty());
        registry.insert(id.clone(), second, Disposable::empty());

        registry.remove(&id, first);
        assert!(registry.contains(&id));

        registry.remove(&id, second);
        assert!(!registry.contains(&id));
    }
}

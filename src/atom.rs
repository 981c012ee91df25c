use crate::arena::{NodeId, NodeMetadata, node_insert, node_remove};
use crate::observer::{Reactive, Subscription};
use crate::transaction::enqueue;
use parking_lot::RwLock;
use std::sync::Arc;

/// Mutable reactive cell
///
/// An Atom owns its value and one node in the arena. Reads through
/// [`get`](Atom::get) register the atom as a dependency of the computation
/// in progress; writes bump the node version, invalidate every derived cell
/// downstream and notify listeners (at the end of the enclosing transaction,
/// or right away outside one).
///
/// Cloning an Atom yields another handle to the same cell.
///
/// # Usage
/// ```ignore
/// let count = Atom::new(0, "count");
/// let doubled = Computed::new("doubled", {
///     let count = count.clone();
///     move |_| count.get() * 2
/// });
///
/// count.set(21);
/// assert_eq!(doubled.get(), 42);
/// ```
pub struct Atom<T> {
    inner: Arc<AtomInner<T>>,
}

struct AtomInner<T> {
    id: NodeId,
    value: RwLock<T>,
}

impl<T> Drop for AtomInner<T> {
    fn drop(&mut self) {
        node_remove(self.id);
    }
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Atom<T> {
    /// Create a new atom holding `value`
    pub fn new(value: T, name: impl Into<Arc<str>>) -> Self {
        let id = node_insert(NodeMetadata::source(name.into()));
        Self {
            inner: Arc::new(AtomInner {
                id,
                value: RwLock::new(value),
            }),
        }
    }

    /// Read the current value and track it as a dependency
    pub fn get(&self) -> T {
        self.inner.id.track();
        self.inner.value.read().clone()
    }

    /// Borrow the current value without cloning it (tracked)
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.inner.id.track();
        f(&self.inner.value.read())
    }

    /// Replace the value and notify dependents
    ///
    /// Always counts as a change; use [`set_if_changed`](Atom::set_if_changed)
    /// to skip writes of an equal value.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.commit();
    }

    /// Mutate the value in place and notify dependents
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        f(&mut self.inner.value.write());
        self.commit();
    }

    /// Debug name given at construction
    pub fn name(&self) -> Arc<str> {
        self.inner.id.name().unwrap_or_else(|| Arc::from(""))
    }

    /// Number of committed writes so far
    pub fn version(&self) -> u64 {
        self.inner.id.version().unwrap_or(0)
    }

    /// Observe committed changes of this atom
    ///
    /// The handler receives the value as of the end of the transaction that
    /// changed it. Dropping the returned [`Subscription`] detaches it.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.id;
        id.sync_notified();
        let weak = Arc::downgrade(&self.inner);
        let listener = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                // Clone out so the handler may write back into this atom.
                let value = inner.value.read().clone();
                handler(&value);
            }
        });
        Subscription::new(id, listener, self.inner.clone())
    }

    fn commit(&self) {
        let notify = self.inner.id.mark_changed();
        enqueue(notify);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Atom<T> {
    /// Write `value` only if it differs from the current one
    ///
    /// Returns true if the atom changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.write();
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.commit();
        true
    }
}

impl<T: Clone + Send + Sync + 'static> Reactive<T> for Atom<T> {
    fn get(&self) -> T {
        Atom::get(self)
    }

    fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Atom::subscribe(self, handler)
    }
}

impl<T: Clone + std::fmt::Debug + Send + Sync + 'static> std::fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("name", &self.name())
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transaction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn set_and_get_round_trip() {
        let atom = Atom::new(1, "number");
        atom.set(2);
        assert_eq!(atom.get(), 2);
        assert_eq!(atom.version(), 1);
        assert_eq!(&*atom.name(), "number");
    }

    #[test]
    fn set_if_changed_skips_equal_values() {
        let atom = Atom::new("a".to_string(), "text");
        assert!(!atom.set_if_changed("a".to_string()));
        assert_eq!(atom.version(), 0);
        assert!(atom.set_if_changed("b".to_string()));
        assert_eq!(atom.version(), 1);
    }

    #[test]
    fn subscriber_sees_committed_value() {
        let atom = Atom::new(0, "observed");
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _subscription = atom.subscribe(move |value| seen_clone.lock().push(*value));

        atom.set(1);
        atom.update(|value| *value += 1);

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn transaction_batches_notifications() {
        let atom = Atom::new(0, "batched");
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let _subscription = atom.subscribe(move |value| {
            assert_eq!(*value, 3);
            calls_clone.fetch_add(1, Ordering::Relaxed);
        });

        Transaction::run(|| {
            atom.set(1);
            atom.set(2);
            atom.set(3);
        });

        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let atom = Atom::new(0, "detached");
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let subscription = atom.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
        });

        atom.set(1);
        drop(subscription);
        atom.set(2);

        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}

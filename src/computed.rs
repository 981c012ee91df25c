use crate::arena::{
    NodeId, NodeMetadata, ReactiveState, RefreshHook, TrackingFrame, node_insert, node_remove,
};
use crate::hash::NodeSet;
use crate::observer::{Reactive, Subscription};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

type RecomputeFn<T> = Box<dyn FnMut(Option<&T>) -> T + Send>;

/// Memoized derived cell
///
/// A Computed holds the result of a pure recompute function over other
/// cells. The function receives the previous value (None on the first run)
/// and reads its dependencies through tracked `get()` calls; whatever it
/// reads becomes its source set for the next run.
///
/// # How it works
/// - Writing any transitive source marks the computed Check (push).
/// - The next read refreshes the sources and compares their versions with
///   the ones seen during the last run; only a moved version triggers a
///   recomputation (pull).
/// - A recomputation that yields a value equal to the previous one keeps
///   the version, so dependents and listeners are not notified.
///
/// # Example
/// ```ignore
/// let first = Atom::new("Ada".to_string(), "first");
/// let last = Atom::new("Lovelace".to_string(), "last");
///
/// let full = Computed::new("full", {
///     let (first, last) = (first.clone(), last.clone());
///     move |_| format!("{} {}", first.get(), last.get())
/// });
///
/// assert_eq!(full.get(), "Ada Lovelace");
/// ```
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    id: NodeId,
    value: RwLock<T>,
    recompute: Mutex<RecomputeFn<T>>,
    /// Source versions observed during the last run
    seen: Mutex<Vec<(NodeId, u64)>>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        node_remove(self.id);
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn source_versions(sources: &NodeSet) -> Vec<(NodeId, u64)> {
    sources
        .iter()
        .filter_map(|source| source.version().map(|version| (*source, version)))
        .collect()
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Computed<T> {
    /// Create a new computed cell
    ///
    /// The function runs once immediately to produce the initial value and
    /// discover the sources.
    pub fn new<F>(name: impl Into<Arc<str>>, recompute: F) -> Self
    where
        F: FnMut(Option<&T>) -> T + Send + 'static,
    {
        let name = name.into();
        let mut recompute: RecomputeFn<T> = Box::new(recompute);

        let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let hook: RefreshHook = Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh();
                }
            });
            let id = node_insert(NodeMetadata::derived(name, hook));

            let frame = TrackingFrame::enter();
            let value = recompute(None);
            let sources = frame.finish();
            id.replace_sources(&sources);

            ComputedInner {
                id,
                value: RwLock::new(value),
                recompute: Mutex::new(recompute),
                seen: Mutex::new(source_versions(&sources)),
            }
        });

        Self { inner }
    }

    /// Get the current value, recomputing first if a source changed
    pub fn get(&self) -> T {
        self.inner.refresh();
        self.inner.id.track();
        self.inner.value.read().clone()
    }

    /// Borrow the current value without cloning it (tracked)
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.inner.refresh();
        self.inner.id.track();
        f(&self.inner.value.read())
    }

    /// Force a recomputation on the next read
    pub fn invalidate(&self) {
        self.inner.id.set_state(ReactiveState::Dirty);
    }

    /// Debug name given at construction
    pub fn name(&self) -> Arc<str> {
        self.inner.id.name().unwrap_or_else(|| Arc::from(""))
    }

    /// Number of times the value actually changed
    pub fn version(&self) -> u64 {
        self.inner.refresh();
        self.inner.id.version().unwrap_or(0)
    }

    /// Observe changes of the derived value
    ///
    /// The handler only runs when a recomputation produced a different
    /// value. Dropping the returned [`Subscription`] detaches it.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.refresh();
        let id = self.inner.id;
        id.sync_notified();
        let weak = Arc::downgrade(&self.inner);
        let listener = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                let value = inner.value.read().clone();
                handler(&value);
            }
        });
        Subscription::new(id, listener, self.inner.clone())
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ComputedInner<T> {
    fn refresh(&self) {
        match self.id.state() {
            None | Some(ReactiveState::Clean) => return,
            Some(ReactiveState::Check) => {
                let seen = self.seen.lock().clone();
                let stale = seen.iter().any(|&(source, version)| {
                    source.refresh();
                    source.version() != Some(version)
                });
                if !stale {
                    cov_mark::hit!(computed_check_verified_clean);
                    self.id.set_state(ReactiveState::Clean);
                    return;
                }
            }
            Some(ReactiveState::Dirty) => {}
        }
        self.recompute();
    }

    fn recompute(&self) {
        // Clean first: a write racing with this run re-marks the node.
        self.id.set_state(ReactiveState::Clean);

        let previous = self.value.read().clone();
        let frame = TrackingFrame::enter();
        let next = {
            let mut recompute = self.recompute.lock();
            recompute(Some(&previous))
        };
        let sources = frame.finish();

        self.id.replace_sources(&sources);
        *self.seen.lock() = source_versions(&sources);

        if next != previous {
            *self.value.write() = next;
            self.id.bump_version();
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Reactive<T> for Computed<T> {
    fn get(&self) -> T {
        Computed::get(self)
    }

    fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Computed::subscribe(self, handler)
    }
}

impl<T> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("node", &self.inner.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Atom, Transaction};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn computed_caches_value() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let computed = Computed::new("answer", move |_| {
            call_count_clone.fetch_add(1, Ordering::Relaxed);
            42
        });

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn computed_recomputes_when_source_changes() {
        let source = Atom::new(2, "source");
        let squared = Computed::new("squared", {
            let source = source.clone();
            move |_| source.get() * source.get()
        });

        assert_eq!(squared.get(), 4);
        source.set(3);
        assert_eq!(squared.get(), 9);
    }

    #[test]
    fn recompute_receives_previous_value() {
        let source = Atom::new(1, "tick");
        let history = Computed::new("history", {
            let source = source.clone();
            move |previous: Option<&Vec<i32>>| {
                let mut history = previous.cloned().unwrap_or_default();
                history.push(source.get());
                history
            }
        });

        source.set(2);
        source.set(3);
        assert_eq!(history.get(), vec![1, 3]);
    }

    #[test]
    fn equal_result_does_not_notify() {
        let source = Atom::new(1, "parity-source");
        let parity = Computed::new("parity", {
            let source = source.clone();
            move |_| source.get() % 2
        });

        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let _subscription = parity.subscribe(move |_| {
            runs_clone.fetch_add(1, Ordering::Relaxed);
        });

        source.set(3);
        assert_eq!(runs.load(Ordering::Relaxed), 0);
        assert_eq!(parity.version(), 0);

        source.set(4);
        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unchanged_intermediate_keeps_downstream_clean() {
        cov_mark::check!(computed_check_verified_clean);
        let source = Atom::new(1, "label-source");
        let parity = Computed::new("label-parity", {
            let source = source.clone();
            move |_| source.get() % 2
        });
        let runs = Arc::new(AtomicUsize::new(0));
        let label = Computed::new("label", {
            let parity = parity.clone();
            let runs = runs.clone();
            move |_| {
                runs.fetch_add(1, Ordering::Relaxed);
                if parity.get() == 0 { "even" } else { "odd" }
            }
        });

        source.set(3);
        assert_eq!(label.get(), "odd");
        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn chain_propagates_through_intermediate_computed() {
        let base = Atom::new(1, "base");
        let plus_one = Computed::new("plus_one", {
            let base = base.clone();
            move |_| base.get() + 1
        });
        let times_ten = Computed::new("times_ten", {
            let plus_one = plus_one.clone();
            move |_| plus_one.get() * 10
        });

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _subscription = times_ten.subscribe(move |value| seen_clone.lock().push(*value));

        base.set(2);
        base.set(5);
        assert_eq!(*seen.lock(), vec![30, 60]);
    }

    #[test]
    fn diamond_dependency_notifies_once_per_transaction() {
        let base = Atom::new(1, "diamond-base");
        let left = Computed::new("left", {
            let base = base.clone();
            move |_| base.get() + 1
        });
        let right = Computed::new("right", {
            let base = base.clone();
            move |_| base.get() * 2
        });
        let sum = Computed::new("sum", {
            let (left, right) = (left.clone(), right.clone());
            move |_| left.get() + right.get()
        });

        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let _subscription = sum.subscribe(move |_| {
            runs_clone.fetch_add(1, Ordering::Relaxed);
        });

        Transaction::run(|| {
            base.set(2);
            base.set(3);
        });

        assert_eq!(sum.get(), 4 + 6);
        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn dynamic_sources_are_relinked() {
        let use_left = Atom::new(true, "switch");
        let left = Atom::new(1, "left-source");
        let right = Atom::new(100, "right-source");
        let picked = Computed::new("picked", {
            let (use_left, left, right) = (use_left.clone(), left.clone(), right.clone());
            move |_| if use_left.get() { left.get() } else { right.get() }
        });

        assert_eq!(picked.get(), 1);
        use_left.set(false);
        assert_eq!(picked.get(), 100);

        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let _subscription = picked.subscribe(move |_| {
            runs_clone.fetch_add(1, Ordering::Relaxed);
        });

        // `left` is no longer a source.
        left.set(2);
        assert_eq!(runs.load(Ordering::Relaxed), 0);
        right.set(101);
        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let computed = Computed::new("forced", move |_| {
            call_count_clone.fetch_add(1, Ordering::Relaxed)
        });

        computed.invalidate();
        assert_eq!(computed.get(), 1);
        assert_eq!(call_count.load(Ordering::Relaxed), 2);
    }
}

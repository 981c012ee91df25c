// Node arena - storage for reactive node metadata
//
// Every Atom and Computed owns exactly one node. The node holds the
// bookkeeping that propagation needs; the value itself stays in the typed
// handle, so the arena never has to know about T.
//
// PUSH-PULL MODEL:
// - Writing an atom bumps its version and pushes Check down to every
//   transitive subscriber (push phase, no user code runs).
// - Reading a computed pulls: it refreshes its sources first and only
//   recomputes when one of their versions moved (pull phase).
// - Nodes that carry listeners are collected during the push phase and
//   handed to the transaction layer, which notifies them once per flush.

use crate::hash::{NodeSet, node_set};
use papaya::HashMap as PapayaHashMap;
use parking_lot::RwLock;
use slab::Slab;
use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};

/// Global node arena - stores all node metadata
static NODE_ARENA: RwLock<Slab<NodeMetadata>> = RwLock::new(Slab::new());

/// Global map: NodeId -> change listeners registered on that node
///
/// Kept outside the arena so that registering a listener never contends with
/// propagation, which takes the arena write lock.
static NODE_LISTENERS: LazyLock<PapayaHashMap<NodeId, RwLock<Slab<Listener>>>> =
    LazyLock::new(PapayaHashMap::new);

/// Callback run when a node's version moves past the last notified one.
pub(crate) type Listener = Arc<dyn Fn() + Send + Sync>;

/// Hook that brings a derived node up to date (recomputing if needed).
pub(crate) type RefreshHook = Arc<dyn Fn() + Send + Sync>;

/// Reactive node states
///
/// - Clean: cached value is current
/// - Check: a transitive source was written, verify source versions first
/// - Dirty: must recompute unconditionally
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReactiveState {
    /// Value is current, use cached
    Clean = 0,
    /// Might be stale, verify sources first
    Check = 1,
    /// Definitely stale, must recompute
    Dirty = 2,
}

/// Metadata for one atom or computed.
pub struct NodeMetadata {
    /// Debug name, also used in log records
    pub name: Arc<str>,
    /// Bumped on every committed change of the node's value
    pub version: u64,
    /// Version observed by the last listener notification
    pub notified_version: u64,
    pub state: ReactiveState,
    /// Derived nodes that read this node during their last computation
    pub subscribers: NodeSet,
    /// Nodes read during this node's last computation (derived nodes only)
    pub sources: NodeSet,
    /// Present for derived nodes only
    pub refresh: Option<RefreshHook>,
}

impl NodeMetadata {
    /// Metadata for a mutable atom
    pub fn source(name: Arc<str>) -> Self {
        Self {
            name,
            version: 0,
            notified_version: 0,
            state: ReactiveState::Clean,
            subscribers: node_set(),
            sources: node_set(),
            refresh: None,
        }
    }

    /// Metadata for a derived node
    pub fn derived(name: Arc<str>, refresh: RefreshHook) -> Self {
        Self {
            refresh: Some(refresh),
            ..Self::source(name)
        }
    }
}

/// Insert a node into the arena
pub fn node_insert(metadata: NodeMetadata) -> NodeId {
    let index = NODE_ARENA.write().insert(metadata);
    NodeId::new(index as u32)
}

/// Remove a node and unlink it from its neighbours
///
/// Called from the owning handle's Drop. Neighbour edges are removed so a
/// later reuse of the slab slot never inherits stale subscriptions.
pub fn node_remove(id: NodeId) {
    {
        let mut arena = NODE_ARENA.write();
        if !arena.contains(id.index()) {
            return;
        }
        let node = arena.remove(id.index());
        for source in &node.sources {
            if let Some(source_node) = arena.get_mut(source.index()) {
                source_node.subscribers.shift_remove(&id);
            }
        }
        for subscriber in &node.subscribers {
            if let Some(subscriber_node) = arena.get_mut(subscriber.index()) {
                subscriber_node.sources.shift_remove(&id);
            }
        }
    }
    NODE_LISTENERS.pin().remove(&id);
}

/// Register a listener on a node, returning its key
pub fn add_listener(id: NodeId, listener: Listener) -> usize {
    let guard = NODE_LISTENERS.pin();
    guard
        .get_or_insert_with(id, || RwLock::new(Slab::new()))
        .write()
        .insert(listener)
}

/// Remove a listener previously registered with [`add_listener`]
pub fn remove_listener(id: NodeId, key: usize) {
    let guard = NODE_LISTENERS.pin();
    if let Some(listeners) = guard.get(&id) {
        let mut listeners = listeners.write();
        if listeners.contains(key) {
            listeners.remove(key);
        }
    }
}

/// Snapshot of a node's listeners, safe to call without holding any lock
pub fn listeners(id: NodeId) -> Vec<Listener> {
    let guard = NODE_LISTENERS.pin();
    guard
        .get(&id)
        .map(|listeners| listeners.read().iter().map(|(_, l)| l.clone()).collect())
        .unwrap_or_default()
}

fn has_listeners(id: NodeId) -> bool {
    let guard = NODE_LISTENERS.pin();
    guard
        .get(&id)
        .is_some_and(|listeners| !listeners.read().is_empty())
}

/// Unique identifier for a node in the arena.
///
/// This is a zero-cost wrapper around a slab index. Accessing the id of a
/// node that has been removed returns None.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    /// Create a new NodeId from a raw index
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Convert to usize for slab indexing
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Access the node metadata with a closure (read-only)
    pub fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&NodeMetadata) -> R,
    {
        let arena = NODE_ARENA.read();
        arena.get(self.index()).map(f)
    }

    /// Access the node metadata with a closure (mutable)
    pub fn with_mut<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&mut NodeMetadata) -> R,
    {
        let mut arena = NODE_ARENA.write();
        arena.get_mut(self.index()).map(f)
    }

    pub fn name(self) -> Option<Arc<str>> {
        self.with(|node| node.name.clone())
    }

    pub fn version(self) -> Option<u64> {
        self.with(|node| node.version)
    }

    pub fn state(self) -> Option<ReactiveState> {
        self.with(|node| node.state)
    }

    pub fn set_state(self, state: ReactiveState) {
        self.with_mut(|node| node.state = state);
    }

    /// Register this node as a dependency of the computation in progress
    pub fn track(self) {
        super::tracking::record(self);
    }

    /// Bring a derived node up to date. No-op for atoms.
    ///
    /// The hook is cloned out first so no arena lock is held while user
    /// code runs inside the recomputation.
    pub fn refresh(self) {
        let hook = self.with(|node| node.refresh.clone()).flatten();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Replace the source edges of a derived node after a recomputation
    pub fn replace_sources(self, sources: &NodeSet) {
        let mut arena = NODE_ARENA.write();
        let Some(node) = arena.get_mut(self.index()) else {
            return;
        };
        let previous = std::mem::replace(&mut node.sources, sources.clone());
        for old in previous.iter().filter(|old| !sources.contains(*old)) {
            if let Some(old_node) = arena.get_mut(old.index()) {
                old_node.subscribers.shift_remove(&self);
            }
        }
        for source in sources {
            if let Some(source_node) = arena.get_mut(source.index()) {
                source_node.subscribers.insert(self);
            }
        }
    }

    /// Record a committed write to this node (push phase)
    ///
    /// Bumps the version, marks every transitive subscriber Check (Dirty
    /// stays Dirty) and returns the nodes among them, self included, that
    /// have listeners waiting for a notification.
    pub fn mark_changed(self) -> Vec<NodeId> {
        let mut reached = node_set();
        {
            let mut arena = NODE_ARENA.write();
            let Some(node) = arena.get_mut(self.index()) else {
                return Vec::new();
            };
            node.version += 1;
            reached.insert(self);

            let mut queue: VecDeque<NodeId> = node.subscribers.iter().copied().collect();
            while let Some(next) = queue.pop_front() {
                if !reached.insert(next) {
                    continue;
                }
                if let Some(subscriber) = arena.get_mut(next.index()) {
                    if subscriber.state == ReactiveState::Clean {
                        subscriber.state = ReactiveState::Check;
                    }
                    queue.extend(subscriber.subscribers.iter().copied());
                }
            }
        }
        reached.into_iter().filter(|id| has_listeners(*id)).collect()
    }

    /// Bump the version of a derived node whose recomputed value changed
    pub fn bump_version(self) {
        self.with_mut(|node| node.version += 1);
    }

    /// Returns true (once) if the version moved since the last notification
    pub fn take_notification(self) -> bool {
        self.with_mut(|node| {
            let moved = node.version != node.notified_version;
            node.notified_version = node.version;
            moved
        })
        .unwrap_or(false)
    }

    /// Treat the current version as already notified
    pub fn sync_notified(self) {
        self.with_mut(|node| node.notified_version = node.version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop_hook() -> RefreshHook {
        Arc::new(|| {})
    }

    #[test]
    fn stale_node_id_returns_none() {
        let id = node_insert(NodeMetadata::source("stale".into()));
        node_remove(id);
        assert!(id.version().is_none() || id.name().as_deref() != Some("stale"));
    }

    #[test]
    fn mark_changed_propagates_check_transitively() {
        let atom = node_insert(NodeMetadata::source("atom".into()));
        let middle = node_insert(NodeMetadata::derived("middle".into(), noop_hook()));
        let leaf = node_insert(NodeMetadata::derived("leaf".into(), noop_hook()));

        let mut sources = node_set();
        sources.insert(atom);
        middle.replace_sources(&sources);
        let mut sources = node_set();
        sources.insert(middle);
        leaf.replace_sources(&sources);

        let notified = atom.mark_changed();
        assert!(notified.is_empty());
        assert_eq!(atom.version(), Some(1));
        assert_eq!(middle.state(), Some(ReactiveState::Check));
        assert_eq!(leaf.state(), Some(ReactiveState::Check));

        node_remove(leaf);
        node_remove(middle);
        node_remove(atom);
    }

    #[test]
    fn mark_changed_reports_nodes_with_listeners() {
        let atom = node_insert(NodeMetadata::source("observed".into()));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let key = add_listener(
            atom,
            Arc::new(move || {
                calls_clone.fetch_add(1, Ordering::Relaxed);
            }),
        );

        assert_eq!(atom.mark_changed(), vec![atom]);
        assert!(atom.take_notification());
        assert!(!atom.take_notification());

        remove_listener(atom, key);
        assert!(atom.mark_changed().is_empty());
        node_remove(atom);
    }

    #[test]
    fn removing_a_source_unlinks_subscriber() {
        let atom = node_insert(NodeMetadata::source("source".into()));
        let derived = node_insert(NodeMetadata::derived("derived".into(), noop_hook()));
        let mut sources = node_set();
        sources.insert(atom);
        derived.replace_sources(&sources);

        node_remove(atom);
        let remaining = derived.with(|node| node.sources.len());
        assert_eq!(remaining, Some(0));
        node_remove(derived);
    }
}

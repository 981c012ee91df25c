// Dependency tracking for computations in progress
//
// Each running recomputation pushes a frame; tracked reads record their node
// into the innermost frame. `untracked` pushes a blind frame that swallows
// reads, which is how observers and actions read cells without accidentally
// subscribing an enclosing computation.

use crate::hash::{NodeSet, node_set};
use std::cell::RefCell;

use super::NodeId;

thread_local! {
    static TRACKING: RefCell<Vec<Option<NodeSet>>> = const { RefCell::new(Vec::new()) };
}

/// Record a read of `id` in the innermost tracking frame, if any
pub(crate) fn record(id: NodeId) {
    TRACKING.with(|stack| {
        if let Some(Some(frame)) = stack.borrow_mut().last_mut() {
            frame.insert(id);
        }
    });
}

/// RAII frame collecting the sources of one recomputation.
///
/// The frame is popped on drop, so a panicking computation does not leave
/// its frame behind to capture unrelated reads.
pub(crate) struct TrackingFrame {
    finished: bool,
}

impl TrackingFrame {
    pub(crate) fn enter() -> Self {
        TRACKING.with(|stack| stack.borrow_mut().push(Some(node_set())));
        Self { finished: false }
    }

    /// Pop the frame and return the nodes read while it was active
    pub(crate) fn finish(mut self) -> NodeSet {
        self.finished = true;
        TRACKING
            .with(|stack| stack.borrow_mut().pop())
            .flatten()
            .unwrap_or_default()
    }
}

impl Drop for TrackingFrame {
    fn drop(&mut self) {
        if !self.finished {
            TRACKING.with(|stack| stack.borrow_mut().pop());
        }
    }
}

struct UntrackedGuard;

impl Drop for UntrackedGuard {
    fn drop(&mut self) {
        TRACKING.with(|stack| stack.borrow_mut().pop());
    }
}

/// Run a closure without tracking dependencies
///
/// Reads inside `f` do not subscribe the computation that is currently
/// running (if any).
///
/// # Example
/// ```ignore
/// let sum = Computed::new("sum", move |_| {
///     // tracked: `sum` recomputes when `a` changes
///     let a = a.get();
///     // untracked: changes to `b` never invalidate `sum`
///     let b = untracked(|| b.get());
///     a + b
/// });
/// ```
pub fn untracked<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    TRACKING.with(|stack| stack.borrow_mut().push(None));
    let _guard = UntrackedGuard;
    f()
}

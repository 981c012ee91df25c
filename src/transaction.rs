use crate::arena::{NodeId, listeners, untracked};
use crate::hash::{NodeSet, node_set};
use std::cell::{Cell, RefCell};

// Thread-local transaction depth counter
// When > 0, writes only queue notifications; they are delivered when the
// outermost transaction exits.
thread_local! {
    static TRANSACTION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

// Set while a flush is delivering notifications. Writes made by listeners
// are queued and picked up by the running flush loop instead of recursing.
thread_local! {
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
}

// Nodes whose listeners may need to run, in the order they were marked.
thread_local! {
    static PENDING: RefCell<NodeSet> = RefCell::new(node_set());
}

/// Check if currently inside a transaction
pub fn is_transaction_active() -> bool {
    TRANSACTION_DEPTH.with(|d| d.get() > 0)
}

/// Queue listener notifications for the given nodes
///
/// Outside a transaction the queue is flushed right away.
pub(crate) fn enqueue(nodes: Vec<NodeId>) {
    if nodes.is_empty() {
        return;
    }
    PENDING.with(|pending| pending.borrow_mut().extend(nodes));
    if !is_transaction_active() {
        flush();
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        FLUSHING.with(|f| f.set(false));
    }
}

/// Deliver all queued notifications
///
/// Uses fixed-point iteration: listeners that write cells queue more
/// notifications, which are delivered by the same loop. Each queued node is
/// refreshed first, and its listeners run only if its version actually
/// moved, so a derived cell that recomputed to an equal value stays silent.
///
/// Returns the number of listener invocations.
pub fn flush() -> usize {
    if FLUSHING.with(Cell::get) || is_transaction_active() {
        return 0;
    }
    FLUSHING.with(|f| f.set(true));
    let _guard = FlushGuard;

    let mut delivered = 0;
    loop {
        let pending = PENDING.with(|pending| std::mem::take(&mut *pending.borrow_mut()));
        if pending.is_empty() {
            break;
        }

        for node in pending {
            node.refresh();
            if !node.take_notification() {
                continue;
            }
            for listener in listeners(node) {
                listener();
                delivered += 1;
            }
        }
    }

    if delivered > 0 {
        tracing::trace!(delivered, "flushed cell notifications");
    }
    delivered
}

/// RAII guard that ensures transaction cleanup happens even on panic.
struct TransactionGuard;

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        let outermost = TRANSACTION_DEPTH.with(|d| {
            let depth = d.get().saturating_sub(1);
            d.set(depth);
            depth == 0
        });

        if outermost && !std::thread::panicking() {
            flush();
        }
    }
}

/// Batch multiple cell writes into one atomic step
///
/// Inside a transaction every write is applied immediately (reads see it),
/// but listeners are only notified once the outermost transaction exits, and
/// they observe the final state only.
///
/// # Example
/// ```ignore
/// // Without transaction: the listener runs twice
/// first.set(1);
/// last.set(2);
///
/// // With transaction: the listener runs once, after both writes
/// Transaction::run(|| {
///     first.set(1);
///     last.set(2);
/// });
/// ```
pub struct Transaction;

impl Transaction {
    /// Run a function within a transaction context
    pub fn run<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        TRANSACTION_DEPTH.with(|d| d.set(d.get() + 1));

        // If f() panics, the guard is dropped during unwinding and the depth
        // is restored; queued notifications stay queued for the next flush.
        let _guard = TransactionGuard;
        f()
    }
}

/// Run a named, state-mutating operation as one transaction
///
/// Actions are the only place field and form state is written. Reads inside
/// an action are never tracked, so an action called from a computation does
/// not become one of its dependencies. The name shows up in trace logs.
pub fn action<F, R>(name: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    tracing::trace!(action = name, "running action");
    untracked(|| Transaction::run(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_returns_value() {
        let result = Transaction::run(|| 42);
        assert_eq!(result, 42);
    }

    #[test]
    fn nesting_keeps_transaction_active_until_outermost_exits() {
        assert!(!is_transaction_active());
        Transaction::run(|| {
            assert!(is_transaction_active());
            Transaction::run(|| assert!(is_transaction_active()));
            assert!(is_transaction_active());
        });
        assert!(!is_transaction_active());
    }

    #[test]
    fn transaction_cleans_up_on_panic() {
        let result = std::panic::catch_unwind(|| {
            Transaction::run(|| panic!("action failed"));
        });
        assert!(result.is_err());
        assert!(!is_transaction_active());
    }

    #[test]
    fn action_runs_in_transaction() {
        let active = action("probe", is_transaction_active);
        assert!(active);
    }
}

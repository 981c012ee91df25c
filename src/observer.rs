//! Observing cells: subscriptions and awaiting a condition.

use crate::arena::{Listener, NodeId, add_listener, remove_listener, untracked};
use futures::future::poll_fn;
use futures::task::AtomicWaker;
use std::any::Any;
use std::sync::Arc;
use std::task::Poll;

/// Read and observe surface shared by [`Atom`](crate::Atom) and
/// [`Computed`](crate::Computed).
pub trait Reactive<T>: Send + Sync {
    /// Current value; tracked when called inside a computation
    fn get(&self) -> T;

    /// Run `handler` after every committed change of the value
    fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static;
}

/// Handle for a registered change listener
///
/// The listener stays registered as long as the handle lives and keeps the
/// observed cell alive with it.
#[must_use = "dropping a Subscription detaches the listener immediately"]
pub struct Subscription {
    node: NodeId,
    key: usize,
    _cell: Arc<dyn Any + Send + Sync>,
}

impl Subscription {
    pub(crate) fn new(node: NodeId, listener: Listener, cell: Arc<dyn Any + Send + Sync>) -> Self {
        let key = add_listener(node, listener);
        Self {
            node,
            key,
            _cell: cell,
        }
    }

    /// Detach the listener (same as dropping the handle)
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        remove_listener(self.node, self.key);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("node", &self.node)
            .field("key", &self.key)
            .finish()
    }
}

/// Wait until `predicate` holds for the value of `cell`
///
/// Resolves immediately if it already holds. Otherwise the future is woken
/// by every committed change of the cell and re-checks the predicate.
/// Dropping the future detaches it from the cell.
///
/// # Example
/// ```ignore
/// let settled = until(form.validation_cell(), |v| !v.validating).await;
/// ```
pub async fn until<T, R, P>(cell: &R, predicate: P) -> T
where
    R: Reactive<T> + ?Sized,
    P: Fn(&T) -> bool,
{
    let waker = Arc::new(AtomicWaker::new());
    let _subscription = {
        let waker = waker.clone();
        cell.subscribe(move |_| waker.wake())
    };

    poll_fn(|cx| {
        waker.register(cx.waker());
        let value = untracked(|| cell.get());
        if predicate(&value) {
            Poll::Ready(value)
        } else {
            Poll::Pending
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Atom, Computed};

    #[tokio::test]
    async fn until_resolves_immediately_when_predicate_holds() {
        let atom = Atom::new(5, "ready");
        let value = until(&atom, |v: &i32| *v == 5).await;
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn until_waits_for_matching_write() {
        let atom = Atom::new(0, "counter");
        let writer = atom.clone();
        let handle = tokio::spawn(async move {
            for n in 1..=3 {
                tokio::task::yield_now().await;
                writer.set(n);
            }
        });

        let value = until(&atom, |v: &i32| *v == 3).await;
        assert_eq!(value, 3);
        handle.await.expect("writer task panicked");
    }

    #[tokio::test]
    async fn until_observes_computed_cells() {
        let atom = Atom::new(1, "source");
        let doubled = Computed::new("doubled", {
            let atom = atom.clone();
            move |_| atom.get() * 2
        });

        let writer = atom.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            writer.set(10);
        });

        assert_eq!(until(&doubled, |v: &i32| *v > 10).await, 20);
    }
}

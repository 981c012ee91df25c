//! Executors for pending validator futures
//!
//! A field validator may answer with a pending future. The field does not
//! poll that future itself; it hands a small settle task to an [`Executor`]
//! and keeps going. The task awaits the validator and commits the result if
//! the validation is still current.
//!
//! ## Choosing an executor
//!
//! - [`DefaultExecutor`]: spawns onto the tokio runtime of the calling
//!   thread when there is one, otherwise onto a process-wide futures
//!   thread pool created on first use.
//! - [`TokioExecutor`]: always spawns onto one specific runtime.
//! - [`futures::executor::ThreadPool`]: implements [`Executor`] directly.
//!
//! ```ignore
//! let runtime = tokio::runtime::Runtime::new()?;
//! let options = FieldOptions::default()
//!     .validate_async(|ctx| async move { check_remote(&ctx.value).await })
//!     .executor(TokioExecutor::new(runtime.handle().clone()));
//! ```

use futures::executor::ThreadPool;
use futures::future::BoxFuture;
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;

/// Drives futures to completion in the background.
pub trait Executor: Send + Sync {
    /// Run `task` to completion without blocking the caller
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// Shared executor handle stored in field options
pub type SharedExecutor = Arc<dyn Executor>;

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        (**self).spawn(task);
    }
}

/// Spawns onto a fixed tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Executor for the runtime behind `handle`
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor for the runtime of the calling thread
    ///
    /// Returns None outside a tokio runtime.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        // The JoinHandle is dropped on purpose, the task runs detached.
        drop(self.handle.spawn(task));
    }
}

impl Executor for ThreadPool {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.spawn_ok(task);
    }
}

static FALLBACK_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

fn fallback_pool() -> Option<&'static ThreadPool> {
    FALLBACK_POOL
        .get_or_init(|| {
            ThreadPool::builder()
                .name_prefix("reaktiv-form-")
                .create()
                .inspect_err(|err| {
                    tracing::error!(%err, "failed to create validation thread pool");
                })
                .ok()
        })
        .as_ref()
}

/// Executor used when a field is not given one explicitly.
///
/// Picks the tokio runtime of the thread that starts the validation and
/// falls back to a shared futures thread pool. If that pool cannot be
/// created the task is driven to completion on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultExecutor;

impl Executor for DefaultExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        if let Ok(handle) = Handle::try_current() {
            drop(handle.spawn(task));
        } else if let Some(pool) = fallback_pool() {
            pool.spawn_ok(task);
        } else {
            futures::executor::block_on(task);
        }
    }
}

//! Task spawning and retained background work.
//!
//! [`spawn`] and [`spawn_blocking`] are thin wrappers over Tokio. [`TaskGroup`]
//! keeps the handles of detached work so an owner can join or cancel it
//! deterministically on shutdown instead of leaking it.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::task::TaskGroup;
//!
//! async fn example() {
//!     let parent = CancellationToken::new();
//!     let group = TaskGroup::with_parent(&parent);
//!
//!     group.spawn(|token| async move {
//!         if token.is_cancelled() {
//!             return;
//!         }
//!         // background work
//!     });
//!
//!     group.join_all().await;
//! }
//! ```

use std::future::Future;
use std::sync::Mutex as StdMutex;

use crate::sync::CancellationToken;

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the Tokio runtime.
///
/// The spawned task may run on a different thread.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;

/// A set of detached tasks that share one cancellation scope.
///
/// Tasks are not awaited when spawned. Their handles are retained until
/// [`join_all`](Self::join_all) or [`shutdown`](Self::shutdown) collects them.
pub struct TaskGroup {
    token: CancellationToken,
    handles: StdMutex<Vec<JoinHandle<()>>>,
}

impl TaskGroup {
    /// Creates a group with its own root cancellation scope.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: StdMutex::new(Vec::new()),
        }
    }

    /// Creates a group whose scope is cancelled together with `parent`.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            handles: StdMutex::new(Vec::new()),
        }
    }

    /// The token handed to every task of this group.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawns `task` with a clone of the group token and retains its handle.
    pub fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = spawn(task(self.token.clone()));
        let mut handles = self.lock_handles();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of retained tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.lock_handles()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Cancels the group scope without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Awaits every retained task, including tasks spawned while joining.
    ///
    /// Returns the number of tasks that panicked or were aborted.
    pub async fn join_all(&self) -> usize {
        let mut failed = 0;
        loop {
            let batch: Vec<JoinHandle<()>> = std::mem::take(&mut *self.lock_handles());
            if batch.is_empty() {
                return failed;
            }
            for handle in batch {
                if handle.await.is_err() {
                    failed += 1;
                }
            }
        }
    }

    /// Cancels the scope, then joins every task.
    pub async fn shutdown(&self) -> usize {
        self.cancel();
        self.join_all().await
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("pending", &self.pending())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

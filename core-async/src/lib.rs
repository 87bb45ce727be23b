//! Async runtime facade for the metadata scanning engine.
//!
//! Every `core-*` and `bridge-*` crate depends on this crate instead of
//! reaching for Tokio directly, so the executor surface stays in one place.
//!
//! # Modules
//!
//! - `task`: task spawning and the retained [`TaskGroup`](task::TaskGroup)
//! - `sync`: synchronization primitives and [`CancellationToken`](sync::CancellationToken)
//! - `time`: sleep, timeout, duration and instant
//! - `io` / `fs`: async I/O traits and filesystem helpers
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(5)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.ok(), Some(42));
//! }
//! ```

pub mod fs;
pub mod io;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};

/// Wait on several futures at once, running the branch of whichever
/// completes first.
pub use tokio::select;

//! Runtime abstraction layer for the media client core.
//!
//! Every `core-*` and `bridge-*` crate reaches the async runtime through this
//! crate instead of naming Tokio directly. Keeping the runtime behind one
//! facade means the session, request and auth layers only ever see:
//!
//! - `task`: spawning detached work (request drivers, expiry timers, flow attempts)
//! - `time`: sleeping, deadlines and a clock that honours Tokio's paused test time
//! - `sync`: channels, locks and the [`CancellationToken`](sync::CancellationToken)
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};

/// Waits on several branches, running the first to complete.
pub use tokio::select;

//! Synchronization primitives.
//!
//! Async-aware locks and channels come from `tokio::sync`; cooperative
//! cancellation comes from `tokio_util`. Short, non-async critical sections in
//! the core use `std::sync::Mutex` directly, everything that may be held
//! across an `.await` must use the types re-exported here.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{oneshot, CancellationToken};
//!
//! # async fn example() {
//! let token = CancellationToken::new();
//! let (tx, rx) = oneshot::channel::<u32>();
//!
//! token.cancel();
//! assert!(token.is_cancelled());
//!
//! tx.send(7).ok();
//! assert_eq!(rx.await.unwrap(), 7);
//! # }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};

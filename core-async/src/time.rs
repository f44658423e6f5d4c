//! Time-related abstractions.
//!
//! [`Instant`] is Tokio's instant rather than `std`'s so that deadlines
//! computed by the request cache follow `tokio::time::pause`/`advance` in
//! tests. Wall-clock time (session expiry) goes through the `Clock` bridge
//! trait instead.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(5)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(5));
//! }
//! ```

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::{sleep, sleep_until, timeout, Instant, Sleep, Timeout};

//! # Bridge Requests
//!
//! Request plumbing between the core and the host's asynchronous request
//! bridge.
//!
//! - [`ResponseRouter`] hands out correlation ids and resolves each pending
//!   request at most once when the host delivers its reply
//! - [`BridgeRequestCache`] deduplicates and caches read requests for a TTL
//!   and sends uncached writes
//!
//! ## Usage
//!
//! ```ignore
//! use core_request::{BridgeRequestCache, CacheConfig, ResponseRouter};
//! use std::sync::Arc;
//!
//! let cache = BridgeRequestCache::new(transport, Arc::new(ResponseRouter::new()), CacheConfig::default());
//! let shows = cache.get("/shows?page=1").await?;
//! cache.invalidate("/shows?page=1");
//! ```

pub mod cache;
pub mod error;
pub mod router;

pub use cache::{BridgeRequestCache, CachedResponse, RequestHeaders, StaticHeaders};
pub use core_runtime::config::CacheConfig;
pub use error::{RequestError, Result};
pub use router::ResponseRouter;

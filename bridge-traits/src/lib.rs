//! # Host Bridge Traits
//!
//! Contracts between the session/auth core and the host environment.
//!
//! ## Overview
//!
//! The core never talks to a platform directly. Everything it consumes from
//! the host is expressed as a trait in this crate and injected at
//! construction time:
//!
//! ### Persistence
//! - [`KeyValueStore`](storage::KeyValueStore) - synchronous string key/value storage
//!
//! ### Request bridge
//! - [`BridgeTransport`](transport::BridgeTransport) - fire-and-forget request dispatch
//! - [`ResponseSink`](transport::ResponseSink) - side channel for correlated replies
//!
//! ### Navigation
//! - [`Navigator`](navigation::Navigator) - route registry, document stack and navigation commands
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - wall-clock source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - forward structured logs to host logging
//!
//! ## Reference implementations
//!
//! In-memory adapters ([`MemoryKeyValueStore`], [`InMemoryNavigator`],
//! [`FixedClock`]) are shipped alongside the traits. Hosts without a native
//! equivalent and the test suites of downstream crates use them directly.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! behind `Arc` across async tasks.

pub mod error;
pub mod navigation;
pub mod storage;
pub mod time;
pub mod transport;

pub use error::BridgeError;

pub use navigation::{
    DocumentId, DocumentRef, InMemoryNavigator, NavigationTransition, Navigator, RouteParams,
    RouteRef, RouteTarget,
};
pub use storage::{KeyValueStore, MemoryKeyValueStore};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
pub use transport::{
    BridgeFailure, BridgeOutcome, BridgeRequest, BridgeTransport, CorrelationId, RequestMethod,
    ResponseSink,
};

//! Request Bridge Abstraction
//!
//! Requests leave the core through a fire-and-forget [`BridgeTransport`].
//! There is no call-return coupling: each request carries a caller-generated
//! [`CorrelationId`] and the host hands the reply back later through a
//! [`ResponseSink`], which resolves the matching pending request at most once.
//!
//! ```text
//! core ── dispatch(BridgeRequest{id: 7, ..}) ──> host transport
//!                                                    │ (any time later)
//! core <── ResponseSink::deliver(7, outcome) ────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::Result;

/// Identifier matching a bridge reply to the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Request verb understood by bridge transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestMethod {
    /// Read request; eligible for caching
    Get,
    /// Write request; never cached
    Post,
}

/// A request handed to the host transport
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeRequest {
    pub correlation_id: CorrelationId,
    pub method: RequestMethod,
    pub url: String,
    pub payload: Option<serde_json::Value>,
    pub headers: HashMap<String, String>,
}

impl BridgeRequest {
    pub fn get(correlation_id: CorrelationId, url: impl Into<String>) -> Self {
        Self {
            correlation_id,
            method: RequestMethod::Get,
            url: url.into(),
            payload: None,
            headers: HashMap::new(),
        }
    }

    pub fn post(
        correlation_id: CorrelationId,
        url: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            correlation_id,
            method: RequestMethod::Post,
            url: url.into(),
            payload: Some(payload),
            headers: HashMap::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Failure reported by the host for a dispatched request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeFailure {
    #[error("Transport unreachable: {0}")]
    Unreachable(String),

    #[error("Remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// What the host delivers back for one correlation id
pub type BridgeOutcome = std::result::Result<serde_json::Value, BridgeFailure>;

/// Side channel through which the host resolves pending requests
pub trait ResponseSink: Send + Sync {
    /// Resolve the request registered under `id`.
    ///
    /// Returns `false` when no request is waiting under that id, either
    /// because it was never registered or because it already resolved.
    fn deliver(&self, id: CorrelationId, outcome: BridgeOutcome) -> bool;
}

/// Fire-and-forget request transport
///
/// `dispatch` must return promptly; the reply, success or failure, goes
/// through `replies` later. An `Err` from `dispatch` itself means the request
/// never left the process.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::transport::{BridgeTransport, BridgeRequest, ResponseSink};
///
/// struct Loopback;
///
/// impl BridgeTransport for Loopback {
///     fn dispatch(&self, request: BridgeRequest, replies: Arc<dyn ResponseSink>) -> Result<()> {
///         replies.deliver(request.correlation_id, Ok(serde_json::json!({"ok": true})));
///         Ok(())
///     }
/// }
/// ```
pub trait BridgeTransport: Send + Sync {
    fn dispatch(&self, request: BridgeRequest, replies: Arc<dyn ResponseSink>) -> Result<()>;
}

//! # Authentication Module
//!
//! Session persistence and the interactive login flow.
//!
//! ## Overview
//!
//! - [`SessionStore`] owns the persisted session record (token, expiry,
//!   login, family members) and notifies subscribers when the authorized
//!   flag flips.
//! - [`AuthFlows`] creates [`AuthFlowController`]s, each walking the user
//!   through login, password and authorizing steps on the host navigation
//!   stack.
//! - [`CredentialExchange`] turns collected credentials into a backend reply;
//!   [`BridgeCredentialExchange`] posts them through the request bridge.
//! - [`SessionPersistingHandler`] stores a granted session before the host
//!   hears about it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use core_auth::{AuthFlows, FlowConfig, SessionPersistingHandler};
//!
//! let flows = AuthFlows::new(navigator, exchange, transitions, FlowConfig::default());
//! let flow = flows.create(Arc::new(SessionPersistingHandler::new(session, host)))?;
//!
//! flow.present()?;
//! flow.submit_login("alice")?;
//! flow.submit_password("secret1")?;
//! ```

pub mod error;
pub mod exchange;
pub mod flow;
pub mod handler;
pub mod session;
pub mod types;

pub use error::{AuthError, Result};
pub use exchange::{BridgeCredentialExchange, CredentialExchange};
pub use flow::{
    AuthFlowController, AuthFlows, FailureKind, FlowConfig, FlowFailure, FlowHandler, FlowRoutes,
    FlowState,
};
pub use handler::SessionPersistingHandler;
pub use session::{SessionStore, SESSION_KEY, TOKEN_EXPIRY_KEY, TOKEN_KEY};
pub use types::{
    normalize_expiry_millis, AuthPayload, Credentials, FamilyMember, SessionField, SessionPatch,
    SessionRecord, ValidatedPatch,
};

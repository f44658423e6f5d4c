//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the session and
//! authentication crates:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Generic publish/subscribe event bus and typed domain events
//!
//! ## Overview
//!
//! Nothing in this crate is a global. The host builds a [`CoreConfig`],
//! initializes logging once, and every bus is an explicitly constructed
//! [`EventBus`] handed to whoever publishes or listens.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AuthConfig, CacheConfig, CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{
    AuthEvent, CoreEvent, EventBus, EventSeverity, EventStream, RequestEvent, SessionEvent,
    Subscription,
};

//! # Core Configuration Module
//!
//! Provides configuration management for the session & auth core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the injected host bridges and the tunables of the
//! request cache and authentication flows. It enforces fail-fast validation
//! so a misconfigured host finds out at startup rather than on first login.
//!
//! ## Required Dependencies
//!
//! - `KeyValueStore` - Session persistence
//! - `BridgeTransport` - Request bridge to the backend
//! - `Navigator` - Route registry and document stack
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - Wall clock used for session expiry (default: `SystemClock`)
//!
//! When the `desktop-shims` feature is enabled, a file-backed
//! `KeyValueStore` and a reqwest `BridgeTransport` are injected automatically
//! if not provided. There is no desktop `Navigator`; it is always required.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .key_value_store(Arc::new(MyStore))
//!     .transport(Arc::new(MyTransport))
//!     .navigator(Arc::new(MyNavigator))
//!     .exchange_url("https://api.example.com/auth/login")
//!     .cache_ttl(Duration::from_secs(120))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{BridgeTransport, Clock, KeyValueStore, Navigator, SystemClock};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime of a cached bridge response.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Passwords must be strictly longer than this.
pub const DEFAULT_MIN_SECRET_LENGTH: usize = 5;

/// Default credential exchange endpoint, relative to the bridge base.
pub const DEFAULT_EXCHANGE_URL: &str = "/auth/login";

/// Application directory name used by the desktop key/value store.
pub const DEFAULT_APP_NAME: &str = "media-client";

/// Request cache tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of a successful response, measured from its resolution.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl }
    }
}

/// Authentication flow tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Endpoint that exchanges `{login, password}` for a session payload
    pub exchange_url: String,
    /// Secrets of this length or shorter are rejected before any request
    pub min_secret_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            exchange_url: DEFAULT_EXCHANGE_URL.to_string(),
            min_secret_length: DEFAULT_MIN_SECRET_LENGTH,
        }
    }
}

/// Core configuration.
///
/// Holds the host bridges and settings required to build the core services.
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Session persistence (required)
    pub store: Arc<dyn KeyValueStore>,

    /// Request bridge (required)
    pub transport: Arc<dyn BridgeTransport>,

    /// Route registry and document stack (required)
    pub navigator: Arc<dyn Navigator>,

    /// Wall clock for session expiry checks
    pub clock: Arc<dyn Clock>,

    pub cache: CacheConfig,

    pub auth: AuthConfig,

    /// Publish `CoreEvent`s on a shared bus
    pub emit_events: bool,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("store", &"KeyValueStore { ... }")
            .field("transport", &"BridgeTransport { ... }")
            .field("navigator", &"Navigator { ... }")
            .field("clock", &"Clock { ... }")
            .field("cache", &self.cache)
            .field("auth", &self.auth)
            .field("emit_events", &self.emit_events)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Cache TTL is non-zero
    /// - Exchange URL is not blank
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl.is_zero() {
            return Err(Error::Config(
                "Cache TTL must be greater than zero".to_string(),
            ));
        }

        if self.auth.exchange_url.trim().is_empty() {
            return Err(Error::Config(
                "Credential exchange URL cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn navigator_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "Navigator".to_string(),
        message: "Navigator implementation is required to present authentication flows. \
                 Inject the host's navigation adapter, or bridge_traits::InMemoryNavigator \
                 for headless hosts."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_store(_path: Option<PathBuf>) -> Result<Arc<dyn KeyValueStore>> {
    Err(Error::CapabilityMissing {
        capability: "KeyValueStore".to_string(),
        message: "KeyValueStore implementation is required for session persistence. \
                 Desktop: enable the 'desktop-shims' feature to use the file-backed store. \
                 Other hosts: inject the platform's local storage."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_store(path: Option<PathBuf>) -> Result<Arc<dyn KeyValueStore>> {
    use bridge_desktop::FileKeyValueStore;

    let store = match path {
        Some(path) => FileKeyValueStore::open(path),
        None => FileKeyValueStore::open_default(DEFAULT_APP_NAME),
    }
    .map_err(|e| Error::Internal(format!("Failed to open default KeyValueStore: {}", e)))?;

    let store: Arc<dyn KeyValueStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_transport() -> Result<Arc<dyn BridgeTransport>> {
    Err(Error::CapabilityMissing {
        capability: "BridgeTransport".to_string(),
        message: "BridgeTransport implementation is required to reach the backend. \
                 Desktop: enable the 'desktop-shims' feature to use the reqwest transport. \
                 Other hosts: inject the native request bridge."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_transport() -> Result<Arc<dyn BridgeTransport>> {
    use bridge_desktop::ReqwestTransport;

    let transport = ReqwestTransport::new()
        .map_err(|e| Error::Internal(format!("Failed to create default transport: {}", e)))?;

    let transport: Arc<dyn BridgeTransport> = Arc::new(transport);
    Ok(transport)
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) once everything is set; it
/// reports the first missing capability or invalid setting.
#[derive(Default)]
pub struct CoreConfigBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    storage_path: Option<PathBuf>,
    transport: Option<Arc<dyn BridgeTransport>>,
    navigator: Option<Arc<dyn Navigator>>,
    clock: Option<Arc<dyn Clock>>,
    cache_ttl: Option<Duration>,
    exchange_url: Option<String>,
    min_secret_length: Option<usize>,
    emit_events: Option<bool>,
}

impl CoreConfigBuilder {
    /// Sets the key/value store used for session persistence.
    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Location of the desktop storage file.
    ///
    /// Only consulted when no store is injected and `desktop-shims` is on.
    pub fn storage_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Sets the request bridge.
    pub fn transport(mut self, transport: Arc<dyn BridgeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the navigator (required).
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Overrides the wall clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the lifetime of cached responses.
    ///
    /// Default: 5 minutes
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the credential exchange endpoint.
    pub fn exchange_url(mut self, url: impl Into<String>) -> Self {
        self.exchange_url = Some(url.into());
        self
    }

    /// Sets the minimum secret length (exclusive).
    pub fn min_secret_length(mut self, length: usize) -> Self {
        self.min_secret_length = Some(length);
        self
    }

    /// Enables or disables the shared `CoreEvent` bus.
    ///
    /// Default: enabled
    pub fn emit_events(mut self, enabled: bool) -> Self {
        self.emit_events = Some(enabled);
        self
    }

    /// Builds the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required bridge is absent and no
    ///   default is available
    /// - [`Error::Config`] when a setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let navigator = self.navigator.ok_or_else(navigator_missing_error)?;

        let store = match self.store {
            Some(store) => store,
            None => provide_default_store(self.storage_path)?,
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => provide_default_transport()?,
        };

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let defaults = AuthConfig::default();
        let config = CoreConfig {
            store,
            transport,
            navigator,
            clock,
            cache: CacheConfig {
                ttl: self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL),
            },
            auth: AuthConfig {
                exchange_url: self.exchange_url.unwrap_or(defaults.exchange_url),
                min_secret_length: self.min_secret_length.unwrap_or(defaults.min_secret_length),
            },
            emit_events: self.emit_events.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}

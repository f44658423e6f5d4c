//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridges (key/value storage, request
//! transport, navigation, clock) into the session and authentication core.
//! Desktop apps typically enable the `desktop-shims` feature, which lets
//! [`CoreConfig`] fall back to the file store and HTTP transport from
//! `bridge-desktop`.
//!
//! ```ignore
//! use core_service::{CoreConfig, CoreService};
//!
//! let config = CoreConfig::builder()
//!     .navigator(navigator)
//!     .key_value_store(store)
//!     .transport(transport)
//!     .build()?;
//! let core = CoreService::new(config)?;
//!
//! let flow = core.create_auth_flow(host_handler)?;
//! flow.present()?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::{
    AuthFlowController, AuthPayload, FailureKind, FlowFailure, FlowHandler, FlowState,
    SessionPatch, SessionRecord, SessionStore,
};
pub use core_request::BridgeRequestCache;
pub use core_runtime::{CoreConfig, CoreConfigBuilder, CoreEvent, EventBus, Subscription};

use bridge_traits::{NavigationTransition, ResponseSink};
use core_auth::{AuthFlows, BridgeCredentialExchange, FlowConfig, SessionPersistingHandler};
use core_request::ResponseRouter;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
///
/// Owns one session store, one request cache and one flow factory. Cloning
/// yields another handle to the same core.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: CoreConfig,
    events: Option<EventBus<CoreEvent>>,
    router: Arc<ResponseRouter>,
    requests: BridgeRequestCache,
    session: Arc<SessionStore>,
    transitions: EventBus<NavigationTransition>,
    flows: AuthFlows,
}

impl CoreService {
    /// Create a new service from a validated configuration.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let events = config.emit_events.then(EventBus::new);
        let router = Arc::new(ResponseRouter::new());

        let requests = match &events {
            Some(bus) => BridgeRequestCache::with_events(
                Arc::clone(&config.transport),
                Arc::clone(&router),
                config.cache,
                bus.clone(),
            ),
            None => BridgeRequestCache::new(
                Arc::clone(&config.transport),
                Arc::clone(&router),
                config.cache,
            ),
        };

        let mut session = SessionStore::load(Arc::clone(&config.store), Arc::clone(&config.clock));
        if let Some(bus) = &events {
            session = session.with_events(bus.clone());
        }
        let session = Arc::new(session);
        requests.add_header_source(session.clone());

        let transitions = EventBus::new();
        let exchange = BridgeCredentialExchange::new(requests.clone(), config.auth.exchange_url.clone());
        let mut flows = AuthFlows::new(
            Arc::clone(&config.navigator),
            Arc::new(exchange),
            transitions.clone(),
            FlowConfig::from(&config.auth),
        );
        if let Some(bus) = &events {
            flows = flows.with_events(bus.clone());
        }

        info!(
            authorized = session.is_authorized(),
            cache_ttl_secs = config.cache.ttl.as_secs(),
            "Core service initialized"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                events,
                router,
                requests,
                session,
                transitions,
                flows,
            }),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn session(&self) -> Arc<SessionStore> {
        Arc::clone(&self.inner.session)
    }

    pub fn requests(&self) -> &BridgeRequestCache {
        &self.inner.requests
    }

    /// Sink hosts deliver bridge replies to, for transports that answer
    /// outside of `dispatch`.
    pub fn response_sink(&self) -> Arc<dyn ResponseSink> {
        self.inner.router.clone()
    }

    /// Bus the host publishes navigation transitions on.
    pub fn transitions(&self) -> &EventBus<NavigationTransition> {
        &self.inner.transitions
    }

    /// Subscribes to core events, or `None` when events are disabled.
    pub fn subscribe_events(&self) -> Option<Subscription<CoreEvent>> {
        self.inner.events.as_ref().map(EventBus::subscribe)
    }

    /// Creates a login flow that stores the granted session before
    /// notifying `handler`.
    pub fn create_auth_flow(&self, handler: Arc<dyn FlowHandler>) -> Result<AuthFlowController> {
        let persisting = SessionPersistingHandler::new(self.session(), handler);
        self.inner
            .flows
            .create(Arc::new(persisting))
            .map_err(CoreError::from)
    }

    /// Fetches `url` through the request cache.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Arc<Value>> {
        self.inner.requests.get(url).await.map_err(CoreError::from)
    }

    /// Clears the session and drops every cached response.
    ///
    /// The cache is emptied even if storage fails.
    pub fn logout(&self) -> Result<()> {
        let cleared = self.inner.session.clear();
        self.inner.requests.clear();
        info!("Logged out");
        cleared.map_err(CoreError::from)
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.inner.config)
            .field("session", &self.inner.session)
            .field("requests", &self.inner.requests)
            .finish_non_exhaustive()
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Storage and transport come from `bridge-desktop`; only navigation must be
/// supplied.
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(navigator: Arc<dyn bridge_traits::Navigator>) -> Result<CoreService> {
    let config = CoreConfig::builder().navigator(navigator).build()?;
    CoreService::new(config)
}

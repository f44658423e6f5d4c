//! # Bridge Request Cache
//!
//! Read requests crossing the bridge are deduplicated and kept for a TTL.
//!
//! ## Entry lifecycle
//!
//! ```text
//! get(url) ──miss──> register id ─> insert entry ─> arm timer ─> dispatch
//!    │                                                   │
//!    └──hit (live)──> same shared future                 ▼
//!                                        reply ok:  timer re-armed from now
//!                                        reply err: entry removed at once
//!                                        deadline:  entry removed
//! ```
//!
//! An entry is only ever removed by the request that created it: each entry
//! remembers its correlation id, and late completions of a replaced entry
//! leave the replacement alone.

use crate::error::{RequestError, Result};
use crate::router::ResponseRouter;
use bridge_traits::{
    BridgeFailure, BridgeOutcome, BridgeRequest, BridgeTransport, CorrelationId, ResponseSink,
};
use core_async::sync::oneshot;
use core_async::task::{self, AbortHandle};
use core_async::time::{sleep_until, Instant};
use core_runtime::config::CacheConfig;
use core_runtime::events::{CoreEvent, EventBus, RequestEvent};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, instrument, trace, warn};

/// A response shared by every caller that asked for the same URL.
pub type CachedResponse = Shared<BoxFuture<'static, Result<Arc<Value>>>>;

/// Source of headers attached to every dispatched request.
pub trait RequestHeaders: Send + Sync {
    fn headers(&self) -> HashMap<String, String>;
}

/// Fixed header set.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    headers: HashMap<String, String>,
}

impl StaticHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

impl RequestHeaders for StaticHeaders {
    fn headers(&self) -> HashMap<String, String> {
        self.headers.clone()
    }
}

struct CacheEntry {
    id: CorrelationId,
    response: CachedResponse,
    expires_at: Instant,
    timer: AbortHandle,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

struct CacheInner {
    transport: Arc<dyn BridgeTransport>,
    router: Arc<ResponseRouter>,
    config: CacheConfig,
    header_sources: Mutex<Vec<Arc<dyn RequestHeaders>>>,
    events: Option<EventBus<CoreEvent>>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CacheInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RequestEvent) {
        if let Some(bus) = &self.events {
            bus.broadcast(CoreEvent::Request(event));
        }
    }

    fn collect_headers(&self) -> HashMap<String, String> {
        let sources = self
            .header_sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        sources.iter().flat_map(|source| source.headers()).collect()
    }

    fn dispatch(&self, request: BridgeRequest) {
        let request = request.with_headers(self.collect_headers());
        let id = request.correlation_id;

        debug!(correlation_id = %id, method = ?request.method, url = %request.url, "Dispatching request");
        self.emit(RequestEvent::Dispatched {
            correlation_id: id.get(),
            url: request.url.clone(),
        });

        let replies: Arc<dyn ResponseSink> = self.router.clone();
        if let Err(error) = self.transport.dispatch(request, Arc::clone(&replies)) {
            warn!(correlation_id = %id, error = %error, "Transport refused request");
            replies.deliver(id, Err(BridgeFailure::Unreachable(error.to_string())));
        }
    }

    fn arm_timer(self: &Arc<Self>, url: &str, id: CorrelationId, deadline: Instant) -> AbortHandle {
        let inner = Arc::downgrade(self);
        let url = url.to_string();

        task::spawn(async move {
            sleep_until(deadline).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(&url, id);
            }
        })
        .abort_handle()
    }

    fn expire(&self, url: &str, id: CorrelationId) {
        let expired = {
            let mut entries = self.entries();
            match entries.get(url) {
                Some(entry) if entry.id == id && !entry.is_live(Instant::now()) => {
                    entries.remove(url)
                }
                _ => None,
            }
        };

        if expired.is_some() {
            debug!(correlation_id = %id, url, "Cache entry expired");
            self.emit(RequestEvent::Invalidated {
                url: url.to_string(),
            });
        }
    }

    /// Restart the TTL of a freshly resolved entry.
    fn refresh(self: &Arc<Self>, url: &str, id: CorrelationId) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(url) else {
            return;
        };
        if entry.id != id {
            return;
        }

        let expires_at = Instant::now() + self.config.ttl;
        let timer = self.arm_timer(url, id, expires_at);
        entry.expires_at = expires_at;
        std::mem::replace(&mut entry.timer, timer).abort();
    }

    fn remove_if_current(&self, url: &str, id: CorrelationId) -> bool {
        let removed = {
            let mut entries = self.entries();
            match entries.get(url) {
                Some(entry) if entry.id == id => entries.remove(url),
                _ => None,
            }
        };
        removed.is_some()
    }

    async fn settle(inner: Weak<Self>, url: String, id: CorrelationId, response: CachedResponse) {
        let outcome = response.await;
        let Some(inner) = inner.upgrade() else {
            return;
        };

        match outcome {
            Ok(_) => {
                trace!(correlation_id = %id, url = %url, "Request resolved");
                inner.refresh(&url, id);
                inner.emit(RequestEvent::Resolved {
                    correlation_id: id.get(),
                    url,
                });
            }
            Err(error) => {
                warn!(correlation_id = %id, url = %url, error = %error, "Request failed");
                if inner.remove_if_current(&url, id) {
                    debug!(correlation_id = %id, url = %url, "Failed entry invalidated");
                }
                inner.emit(RequestEvent::Failed {
                    correlation_id: id.get(),
                    url,
                    message: error.to_string(),
                });
            }
        }
    }
}

async fn receive(receiver: oneshot::Receiver<BridgeOutcome>) -> Result<Value> {
    match receiver.await {
        Ok(outcome) => outcome.map_err(RequestError::from),
        Err(_) => Err(RequestError::Dropped),
    }
}

/// Forgets a pending request whose caller stopped waiting.
struct PendingGuard<'a> {
    router: &'a ResponseRouter,
    id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.router.forget(self.id);
    }
}

/// TTL cache in front of a [`BridgeTransport`].
///
/// Cloning yields another handle to the same cache.
///
/// All methods that dispatch spawn helper tasks and must run inside a Tokio
/// runtime.
#[derive(Clone)]
pub struct BridgeRequestCache {
    inner: Arc<CacheInner>,
}

impl BridgeRequestCache {
    pub fn new(
        transport: Arc<dyn BridgeTransport>,
        router: Arc<ResponseRouter>,
        config: CacheConfig,
    ) -> Self {
        Self::build(transport, router, config, None)
    }

    /// Same as [`new`](Self::new), publishing [`RequestEvent`]s on `events`.
    pub fn with_events(
        transport: Arc<dyn BridgeTransport>,
        router: Arc<ResponseRouter>,
        config: CacheConfig,
        events: EventBus<CoreEvent>,
    ) -> Self {
        Self::build(transport, router, config, Some(events))
    }

    fn build(
        transport: Arc<dyn BridgeTransport>,
        router: Arc<ResponseRouter>,
        config: CacheConfig,
        events: Option<EventBus<CoreEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                transport,
                router,
                config,
                header_sources: Mutex::new(Vec::new()),
                events,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Adds a header source consulted on every dispatch.
    ///
    /// Later sources override earlier ones for the same header name.
    pub fn add_header_source(&self, source: Arc<dyn RequestHeaders>) {
        self.inner
            .header_sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source);
    }

    /// Returns the response for `url`, dispatching only on a cache miss.
    ///
    /// Concurrent callers for the same URL receive clones of one shared
    /// future; the request crosses the bridge once. The reply is consumed
    /// eagerly whether or not anyone awaits it.
    pub fn get(&self, url: &str) -> CachedResponse {
        let now = Instant::now();
        let mut stale = None;

        let (id, response) = {
            let mut entries = self.inner.entries();
            match entries.get(url) {
                Some(entry) if entry.is_live(now) => {
                    trace!(correlation_id = %entry.id, url, "Cache hit");
                    return entry.response.clone();
                }
                Some(_) => stale = entries.remove(url),
                None => {}
            }

            let (id, receiver) = self.inner.router.register();
            let response: CachedResponse = receive(receiver)
                .map(|outcome| outcome.map(Arc::new))
                .boxed()
                .shared();
            let expires_at = now + self.inner.config.ttl;
            let timer = self.inner.arm_timer(url, id, expires_at);

            entries.insert(
                url.to_string(),
                CacheEntry {
                    id,
                    response: response.clone(),
                    expires_at,
                    timer,
                },
            );
            (id, response)
        };

        if let Some(stale) = stale {
            debug!(correlation_id = %stale.id, url, "Cache entry past its deadline replaced");
            self.inner.emit(RequestEvent::Invalidated {
                url: url.to_string(),
            });
        }

        task::spawn(CacheInner::settle(
            Arc::downgrade(&self.inner),
            url.to_string(),
            id,
            response.clone(),
        ));
        self.inner.dispatch(BridgeRequest::get(id, url));

        response
    }

    /// Sends `data` to `url`. Never cached.
    #[instrument(skip(self, data))]
    pub async fn post(&self, url: &str, data: Value) -> Result<Value> {
        let (id, receiver) = self.inner.router.register();
        let _pending = PendingGuard {
            router: &self.inner.router,
            id,
        };

        self.inner.dispatch(BridgeRequest::post(id, url, data));

        let outcome = receive(receiver).await;
        match &outcome {
            Ok(_) => self.inner.emit(RequestEvent::Resolved {
                correlation_id: id.get(),
                url: url.to_string(),
            }),
            Err(error) => {
                warn!(correlation_id = %id, error = %error, "Post failed");
                self.inner.emit(RequestEvent::Failed {
                    correlation_id: id.get(),
                    url: url.to_string(),
                    message: error.to_string(),
                });
            }
        }
        outcome
    }

    /// Drops the entry for `url`, cancelling its timer.
    ///
    /// Callers already holding the response still receive it. Returns
    /// `false` if nothing was cached.
    pub fn invalidate(&self, url: &str) -> bool {
        let removed = self.inner.entries().remove(url);
        let Some(entry) = removed else {
            return false;
        };

        debug!(correlation_id = %entry.id, url, "Cache entry invalidated");
        drop(entry);
        self.inner.emit(RequestEvent::Invalidated {
            url: url.to_string(),
        });
        true
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let drained: Vec<(String, CacheEntry)> = self.inner.entries().drain().collect();
        for (url, _) in &drained {
            self.inner.emit(RequestEvent::Invalidated { url: url.clone() });
        }
        debug!(entries = drained.len(), "Request cache cleared");
    }

    /// Whether a live entry exists for `url`.
    pub fn contains(&self, url: &str) -> bool {
        let now = Instant::now();
        self.inner
            .entries()
            .get(url)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn router(&self) -> &Arc<ResponseRouter> {
        &self.inner.router
    }
}

impl fmt::Debug for BridgeRequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeRequestCache")
            .field("config", &self.inner.config)
            .field("entries", &self.inner.entries().len())
            .field("router", &self.inner.router)
            .finish()
    }
}

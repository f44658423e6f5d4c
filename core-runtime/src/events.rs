//! # Event Bus System
//!
//! Minimal publish/subscribe primitive shared by every core component, plus
//! the typed lifecycle events the core publishes for observers.
//!
//! ## Overview
//!
//! - **EventBus<T>**: broadcasts a value to every subscriber registered at
//!   call time, synchronously and in subscription order
//! - **Subscription<T>**: a subscriber handle; it is a `Stream` of values and
//!   can detach itself with [`Subscription::unsubscribe`] (dropping it does
//!   the same)
//! - **EventStream<T>**: a subscription with an optional filter predicate
//! - **CoreEvent**: session, auth-flow and request lifecycle events
//!
//! ## Delivery semantics
//!
//! ```text
//!              broadcast(v)
//!                   │  snapshot of subscribers at call time
//!        ┌──────────┼──────────┐
//!        ▼          ▼          ▼
//!   [queue #1]  [queue #2]  [queue #3]   unbounded, never blocks the caller
//!        │          │          │
//!   recv().await / Stream::next()
//! ```
//!
//! - No replay and no queueing on the bus itself: with zero subscribers a
//!   broadcast value is dropped.
//! - No backpressure: each subscriber owns an unbounded queue, so a slow
//!   consumer never stalls the broadcaster.
//! - A subscriber that unsubscribes (from any task, even while a broadcast
//!   is in progress) never receives a value broadcast after that point, and
//!   never receives one value twice.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::EventBus;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus: EventBus<u32> = EventBus::new();
//! let mut sub = bus.subscribe();
//!
//! assert_eq!(bus.broadcast(7), 1);
//! assert_eq!(sub.recv().await, Some(7));
//!
//! sub.unsubscribe();
//! assert_eq!(bus.broadcast(8), 0);
//! # }
//! ```

use core_async::sync::mpsc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

// ============================================================================
// Event Bus
// ============================================================================

struct Subscriber<T> {
    id: u64,
    sender: mpsc::UnboundedSender<T>,
}

struct Registry<T> {
    next_id: u64,
    subscribers: Vec<Subscriber<T>>,
}

impl<T> Registry<T> {
    fn remove(&mut self, id: u64) {
        self.subscribers.retain(|s| s.id != id);
    }
}

fn lock_registry<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Multi-subscriber broadcast channel with explicit unsubscribe.
///
/// Cloning an `EventBus` yields another handle to the same subscriber list.
pub struct EventBus<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Registers a new subscriber.
    ///
    /// The subscriber receives every value broadcast from now until it
    /// unsubscribes or is dropped. Past values are not replayed.
    pub fn subscribe(&self) -> Subscription<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut registry = lock_registry(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.push(Subscriber { id, sender });

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
            active: true,
        }
    }

    /// Delivers `value` to every subscriber registered at call time.
    ///
    /// Returns the number of subscribers that accepted the value. Handles
    /// found closed during delivery are pruned.
    pub fn broadcast(&self, value: T) -> usize {
        let snapshot: Vec<(u64, mpsc::UnboundedSender<T>)> = {
            let registry = lock_registry(&self.registry);
            registry
                .subscribers
                .iter()
                .map(|s| (s.id, s.sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, sender) in snapshot {
            if sender.send(value.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(id);
            }
        }

        if !closed.is_empty() {
            let mut registry = lock_registry(&self.registry);
            registry.subscribers.retain(|s| !closed.contains(&s.id));
        }

        delivered
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        lock_registry(&self.registry).subscribers.len()
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "subscriber_count",
                &lock_registry(&self.registry).subscribers.len(),
            )
            .finish()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A subscriber handle returned by [`EventBus::subscribe`].
///
/// Values already queued before unsubscribing can still be drained; nothing
/// broadcast afterwards is accepted.
pub struct Subscription<T> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<T>,
    registry: Weak<Mutex<Registry<T>>>,
    active: bool,
}

impl<T> Subscription<T> {
    /// Waits for the next value.
    ///
    /// Returns `None` once the subscription is detached (or the bus is gone)
    /// and its queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Takes the next queued value without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Detaches this handle from the bus. Calling it again is a no-op.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.receiver.close();
        if let Some(registry) = self.registry.upgrade() {
            lock_registry(&registry).remove(self.id);
        }
    }

    /// Whether the handle is still registered.
    pub fn is_active(&self) -> bool {
        self.active && self.registry.strong_count() > 0
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A [`Subscription`] that skips values not matching a predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus: EventBus<CoreEvent> = EventBus::new();
/// let auth_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Auth(_)));
/// ```
pub struct EventStream<T> {
    subscription: Subscription<T>,
    filter: Option<EventFilter<T>>,
}

impl<T> EventStream<T> {
    pub fn new(subscription: Subscription<T>) -> Self {
        Self {
            subscription,
            filter: None,
        }
    }

    /// Only values for which `predicate` returns true are yielded.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next value that passes the filter.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let value = self.subscription.recv().await?;
            if self.matches(&value) {
                return Some(value);
            }
        }
    }

    /// Takes the next queued value that passes the filter, without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        while let Some(value) = self.subscription.try_recv() {
            if self.matches(&value) {
                return Some(value);
            }
        }
        None
    }

    /// Detaches the underlying subscription.
    pub fn unsubscribe(&mut self) {
        self.subscription.unsubscribe();
    }

    fn matches(&self, value: &T) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(value))
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("subscription", &self.subscription)
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level lifecycle event published by core components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Session store events
    Session(SessionEvent),
    /// Authentication flow events
    Auth(AuthEvent),
    /// Bridge request events
    Request(RequestEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Session(e) => e.description(),
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Request(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::Request(RequestEvent::Failed { .. }) => EventSeverity::Warning,
            CoreEvent::Session(SessionEvent::Authorized { .. }) => EventSeverity::Info,
            CoreEvent::Session(SessionEvent::Deauthorized) => EventSeverity::Info,
            CoreEvent::Auth(AuthEvent::Succeeded { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events emitted by the session store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// The derived `authorized` flag became true.
    Authorized {
        /// Login of the authorized account, if recorded.
        login: Option<String>,
    },
    /// The derived `authorized` flag became false.
    Deauthorized,
    /// The session was reset to an empty record.
    Cleared,
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::Authorized { .. } => "Session authorized",
            SessionEvent::Deauthorized => "Session no longer authorized",
            SessionEvent::Cleared => "Session cleared",
        }
    }
}

/// Events emitted by authentication flows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A flow was presented to the user.
    Presented { flow_id: u64 },
    /// A flow moved to a new step (`login`, `password`, `authorizing`).
    StepEntered { flow_id: u64, step: String },
    /// The credential exchange produced a session.
    Succeeded { flow_id: u64 },
    /// The attempt failed (`bad-credentials`, `bad-response`, `abort`).
    Failed { flow_id: u64, kind: String },
    /// The flow returned to idle.
    Dismissed { flow_id: u64 },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::Presented { .. } => "Authentication flow presented",
            AuthEvent::StepEntered { .. } => "Authentication step entered",
            AuthEvent::Succeeded { .. } => "Authentication succeeded",
            AuthEvent::Failed { .. } => "Authentication failed",
            AuthEvent::Dismissed { .. } => "Authentication flow dismissed",
        }
    }
}

/// Events emitted by the bridge request cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RequestEvent {
    /// A request crossed the bridge.
    Dispatched { correlation_id: u64, url: String },
    /// A reply resolved a request successfully.
    Resolved { correlation_id: u64, url: String },
    /// A request failed.
    Failed {
        correlation_id: u64,
        url: String,
        message: String,
    },
    /// A cache entry was dropped (explicitly or by TTL).
    Invalidated { url: String },
}

impl RequestEvent {
    fn description(&self) -> &str {
        match self {
            RequestEvent::Dispatched { .. } => "Request dispatched",
            RequestEvent::Resolved { .. } => "Request resolved",
            RequestEvent::Failed { .. } => "Request failed",
            RequestEvent::Invalidated { .. } => "Cache entry invalidated",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_event_bus_creation() {
        let bus: EventBus<u32> = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_dropped() {
        let bus: EventBus<u32> = EventBus::new();
        assert_eq!(bus.broadcast(1), 0);

        let mut late = bus.subscribe();
        assert_eq!(late.try_recv(), None);
    }

    #[tokio::test]
    async fn test_delivery_in_subscription_order() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.broadcast("a"), 2);
        assert_eq!(bus.broadcast("b"), 2);

        assert_eq!(first.recv().await, Some("a"));
        assert_eq!(first.recv().await, Some("b"));
        assert_eq!(second.recv().await, Some("a"));
        assert_eq!(second.recv().await, Some("b"));
    }

    #[test]
    fn test_value_after_unsubscribe_is_never_delivered() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.broadcast(1);
        sub.unsubscribe();
        bus.broadcast(2);

        assert_eq!(sub.try_recv(), Some(1));
        assert_eq!(sub.try_recv(), None);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_double_unsubscribe_is_noop() {
        let bus: EventBus<u8> = EventBus::new();
        let mut sub = bus.subscribe();
        let _other = bus.subscribe();

        sub.unsubscribe();
        sub.unsubscribe();

        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus: EventBus<u8> = EventBus::new();
        {
            let _sub = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_from_consumer_task() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let mut observer = bus.subscribe();

        let consumer = tokio::spawn(async move {
            let first = sub.recv().await;
            sub.unsubscribe();
            (first, sub.recv().await)
        });

        bus.broadcast(10);
        let (first, after) = consumer.await.unwrap();
        bus.broadcast(11);

        assert_eq!(first, Some(10));
        assert_eq!(after, None);
        assert_eq!(observer.recv().await, Some(10));
        assert_eq!(observer.recv().await, Some(11));
    }

    #[tokio::test]
    async fn test_subscription_is_a_stream() {
        let bus = EventBus::new();
        let sub = bus.subscribe();

        bus.broadcast(1);
        bus.broadcast(2);
        bus.broadcast(3);
        drop(bus);

        let collected: Vec<i32> = sub.take(3).collect().await;
        assert_eq!(collected, vec![1, 2, 3]);
    }

    #[test]
    fn test_clone_shares_subscribers() {
        let bus: EventBus<u8> = EventBus::new();
        let clone = bus.clone();
        let mut sub = bus.subscribe();

        assert_eq!(clone.broadcast(5), 1);
        assert_eq!(sub.try_recv(), Some(5));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new();
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Auth(_)));

        bus.broadcast(CoreEvent::Request(RequestEvent::Invalidated {
            url: "/catalog".to_string(),
        }));
        let auth_event = CoreEvent::Auth(AuthEvent::Presented { flow_id: 1 });
        bus.broadcast(auth_event.clone());

        assert_eq!(stream.recv().await, Some(auth_event));
    }

    #[test]
    fn test_event_stream_try_recv_empty() {
        let bus: EventBus<CoreEvent> = EventBus::new();
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Auth(AuthEvent::Failed {
            flow_id: 1,
            kind: "abort".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Warning);

        let authorized = CoreEvent::Session(SessionEvent::Authorized {
            login: Some("alice".to_string()),
        });
        assert_eq!(authorized.severity(), EventSeverity::Info);

        let dispatched = CoreEvent::Request(RequestEvent::Dispatched {
            correlation_id: 1,
            url: "/catalog".to_string(),
        });
        assert_eq!(dispatched.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        let event = CoreEvent::Session(SessionEvent::Cleared);
        assert_eq!(event.description(), "Session cleared");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Auth(AuthEvent::StepEntered {
            flow_id: 3,
            step: "password".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("StepEntered"));

        let decoded: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }
}

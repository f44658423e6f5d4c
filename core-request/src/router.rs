//! Correlation of bridge replies with pending requests.

use bridge_traits::{BridgeOutcome, CorrelationId, ResponseSink};
use core_async::sync::oneshot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Pending-request table shared by every request issued through one bridge.
///
/// Ids come from a monotonically increasing counter and are never reused
/// for the lifetime of the router. Each registered id resolves at most once;
/// late or duplicate replies are ignored.
pub struct ResponseRouter {
    next_id: AtomicU64,
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<BridgeOutcome>>>,
}

impl ResponseRouter {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves a fresh correlation id and the receiver its reply lands in.
    pub fn register(&self) -> (CorrelationId, oneshot::Receiver<BridgeOutcome>) {
        let id = CorrelationId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = oneshot::channel();
        self.lock().insert(id, sender);
        (id, receiver)
    }

    /// Drops a pending request; its receiver observes a closed channel.
    ///
    /// Returns `false` if nothing was pending under `id`.
    pub fn forget(&self, id: CorrelationId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, oneshot::Sender<BridgeOutcome>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResponseRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for ResponseRouter {
    fn deliver(&self, id: CorrelationId, outcome: BridgeOutcome) -> bool {
        let Some(sender) = self.lock().remove(&id) else {
            debug!(correlation_id = %id, "Reply for unknown or settled request ignored");
            return false;
        };

        if sender.send(outcome).is_err() {
            debug!(correlation_id = %id, "Reply arrived after the requester went away");
            return false;
        }

        true
    }
}

impl std::fmt::Debug for ResponseRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseRouter")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::BridgeFailure;
    use serde_json::json;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let router = ResponseRouter::new();
        let (first, _rx1) = router.register();
        let (second, _rx2) = router.register();

        assert!(second > first);
        assert_eq!(router.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_deliver_resolves_once() {
        let router = ResponseRouter::new();
        let (id, receiver) = router.register();

        assert!(router.deliver(id, Ok(json!({"page": 1}))));
        assert!(!router.deliver(id, Ok(json!({"page": 2}))));

        assert_eq!(receiver.await.unwrap(), Ok(json!({"page": 1})));
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn test_deliver_unknown_id() {
        let router = ResponseRouter::new();
        assert!(!router.deliver(CorrelationId::new(99), Ok(json!(null))));
    }

    #[tokio::test]
    async fn test_forget_closes_receiver() {
        let router = ResponseRouter::new();
        let (id, receiver) = router.register();

        assert!(router.forget(id));
        assert!(!router.forget(id));
        assert!(receiver.await.is_err());
        assert!(!router.deliver(id, Err(BridgeFailure::Malformed("late".into()))));
    }

    #[test]
    fn test_deliver_after_receiver_dropped() {
        let router = ResponseRouter::new();
        let (id, receiver) = router.register();
        drop(receiver);

        assert!(!router.deliver(id, Ok(json!({}))));
        assert_eq!(router.pending_count(), 0);
    }
}

//! Façade wiring: configuration, login, events and logout.

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BridgeRequest, BridgeTransport, CorrelationId, FixedClock, InMemoryNavigator, MemoryKeyValueStore,
    Navigator, RequestMethod, ResponseSink, RouteParams,
};
use core_runtime::events::{AuthEvent, SessionEvent};
use core_runtime::Error as ConfigError;
use core_service::{
    AuthPayload, CoreConfig, CoreError, CoreEvent, CoreService, FlowFailure, FlowHandler,
    FlowState,
};
use mockall::mock;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    Transport {}

    impl BridgeTransport for Transport {
        fn dispatch(&self, request: BridgeRequest, replies: Arc<dyn ResponseSink>) -> BridgeResult<()>;
    }
}

/// Grants any login with a long enough password; GETs echo their headers.
struct Backend;

impl BridgeTransport for Backend {
    fn dispatch(&self, request: BridgeRequest, replies: Arc<dyn ResponseSink>) -> BridgeResult<()> {
        let reply = match request.method {
            RequestMethod::Post => json!({
                "ok": true,
                "token": "t-service",
                "till": 1_800_000_000,
                "login": request.payload.as_ref().map(|body| body["login"].clone()),
            }),
            RequestMethod::Get => json!({ "headers": request.headers }),
        };
        replies.deliver(request.correlation_id, Ok(reply));
        Ok(())
    }
}

#[derive(Default)]
struct Host {
    logins: Mutex<Vec<Option<String>>>,
}

impl FlowHandler for Host {
    fn on_success(&self, payload: &AuthPayload) {
        self.logins.lock().unwrap().push(payload.login.clone());
    }

    fn on_failure(&self, failure: &FlowFailure) {
        panic!("unexpected failure: {}", failure);
    }
}

fn navigator() -> Arc<InMemoryNavigator> {
    let navigator = Arc::new(InMemoryNavigator::new());
    navigator.register_route("home").unwrap();
    navigator.navigate("home", RouteParams::new()).unwrap();
    navigator
}

fn service(store: Arc<MemoryKeyValueStore>) -> CoreService {
    let config = CoreConfig::builder()
        .key_value_store(store)
        .transport(Arc::new(Backend))
        .navigator(navigator())
        .clock(Arc::new(FixedClock::at_millis(1_700_000_000_000)))
        .build()
        .unwrap();
    CoreService::new(config).unwrap()
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut transport = MockTransport::new();
    transport.expect_dispatch().never();

    let mut config = CoreConfig::builder()
        .key_value_store(Arc::new(MemoryKeyValueStore::new()))
        .transport(Arc::new(transport))
        .navigator(navigator())
        .build()
        .unwrap();
    config.cache.ttl = Duration::ZERO;

    let result = CoreService::new(config);
    assert!(matches!(result, Err(CoreError::Config(ConfigError::Config(_)))));
}

#[tokio::test]
async fn test_login_through_service() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let core = service(store.clone());
    let mut events = core.subscribe_events().expect("events enabled");
    let host = Arc::new(Host::default());

    let flow = core.create_auth_flow(host.clone()).unwrap();
    flow.present().unwrap();
    flow.submit_login("bob").unwrap();
    flow.submit_password("correct-horse").unwrap();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(flow.state(), FlowState::Idle);
    assert_eq!(*host.logins.lock().unwrap(), vec![Some("bob".to_string())]);
    assert!(core.session().is_authorized());
    assert!(core.session().is_extended());

    let page = core.fetch("/home").await.unwrap();
    assert_eq!(page["headers"]["Authorization"], "Bearer t-service");

    let mut seen = Vec::new();
    while let Some(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&CoreEvent::Auth(AuthEvent::Succeeded { flow_id: flow.id() })));
    assert!(seen.contains(&CoreEvent::Session(SessionEvent::Authorized {
        login: Some("bob".to_string()),
    })));
}

#[tokio::test]
async fn test_logout_clears_session_and_cache() {
    let store = Arc::new(MemoryKeyValueStore::with_entries([(
        "session",
        r#"{"token":"old","login":"bob","loggedFlag":1}"#,
    )]));
    let core = service(store.clone());
    assert!(core.session().is_authorized());

    core.fetch("/home").await.unwrap();
    assert!(core.requests().contains("/home"));

    let mut changes = core.session().subscription();
    core.logout().unwrap();

    assert!(!core.session().is_authorized());
    assert!(!changes.try_recv().expect("cleared").is_authorized());
    assert!(core.requests().is_empty());
    assert!(store.snapshot().is_empty());

    let page = core.fetch("/home").await.unwrap();
    assert!(page["headers"].get("Authorization").is_none());
}

#[tokio::test]
async fn test_events_can_be_disabled() {
    let config = CoreConfig::builder()
        .key_value_store(Arc::new(MemoryKeyValueStore::new()))
        .transport(Arc::new(Backend))
        .navigator(navigator())
        .emit_events(false)
        .build()
        .unwrap();
    let core = CoreService::new(config).unwrap();

    assert!(core.subscribe_events().is_none());
    let delivered = core
        .response_sink()
        .deliver(CorrelationId::new(99), Ok(json!(null)));
    assert!(!delivered);
}

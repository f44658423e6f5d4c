//! # Authentication Flow
//!
//! Multi-step credential collection coordinated with the host navigation
//! stack.
//!
//! ## States
//!
//! ```text
//!            present()          submit_login()          submit_password()
//!   Idle ───────────────> Login ──────────────> Password ─────────────────> Authorizing
//!    ▲                      ▲                                                   │
//!    │                      └─────────── reset() / back to login ───────────────┤
//!    │                                                                          │
//!    └──────────── dismiss() / success / back out of login ─────────────────────┘
//! ```
//!
//! Every flow owns three routes, `login-<id>`, `password-<id>` and
//! `authorizing-<id>`, registered when the flow is created and unregistered
//! by [`AuthFlowController::destroy`].
//!
//! ## Navigation rules
//!
//! While presented, the flow listens to host transitions:
//! - leaving the login route (no modal on top) for a route outside the flow
//!   aborts the flow: it is dismissed and the handler receives
//!   [`FailureKind::Abort`]
//! - returning to the login route from another step starts over: any
//!   in-flight exchange is abandoned and the password forgotten
//!
//! An abort always wins over a reply that is still in flight. Handlers are
//! invoked without any internal lock held, so they may call back into the
//! controller.

use crate::error::{AuthError, Result};
use crate::exchange::CredentialExchange;
use crate::types::{AuthPayload, Credentials};
use bridge_traits::{DocumentRef, NavigationTransition, Navigator, RouteParams};
use core_async::sync::CancellationToken;
use core_async::task::{self, AbortHandle};
use core_request::RequestError;
use core_runtime::config::AuthConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, Subscription};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, warn};

/// Where a flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    Login,
    Password,
    Authorizing,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::Login => "login",
            FlowState::Password => "password",
            FlowState::Authorizing => "authorizing",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route names of one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRoutes {
    pub login: String,
    pub password: String,
    pub authorizing: String,
}

impl FlowRoutes {
    pub fn for_flow(id: u64) -> Self {
        Self {
            login: format!("login-{}", id),
            password: format!("password-{}", id),
            authorizing: format!("authorizing-{}", id),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [
            self.login.as_str(),
            self.password.as_str(),
            self.authorizing.as_str(),
        ]
    }

    /// Whether `route` belongs to this flow.
    pub fn contains(&self, route: &str) -> bool {
        self.all().contains(&route)
    }
}

/// Why an attempt did not produce a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The backend rejected the credentials
    BadCredentials,
    /// The reply was missing or unusable
    BadResponse,
    /// The user navigated away from the flow
    Abort,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::BadCredentials => "bad-credentials",
            FailureKind::BadResponse => "bad-response",
            FailureKind::Abort => "abort",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl FlowFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn abort() -> Self {
        Self::new(FailureKind::Abort, "Authentication abandoned by navigation")
    }
}

impl fmt::Display for FlowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Receives the outcome of a flow.
pub trait FlowHandler: Send + Sync {
    fn on_success(&self, payload: &AuthPayload);
    fn on_failure(&self, failure: &FlowFailure);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// Secrets must be strictly longer than this
    pub min_secret_length: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for FlowConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            min_secret_length: config.min_secret_length,
        }
    }
}

/// Creates flows sharing one navigator, exchange and transition stream.
///
/// Owns the id counter, so route names never collide between flows created
/// by the same factory.
pub struct AuthFlows {
    next_id: AtomicU64,
    navigator: Arc<dyn Navigator>,
    exchange: Arc<dyn CredentialExchange>,
    transitions: EventBus<NavigationTransition>,
    config: FlowConfig,
    events: Option<EventBus<CoreEvent>>,
}

impl AuthFlows {
    pub fn new(
        navigator: Arc<dyn Navigator>,
        exchange: Arc<dyn CredentialExchange>,
        transitions: EventBus<NavigationTransition>,
        config: FlowConfig,
    ) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            navigator,
            exchange,
            transitions,
            config,
            events: None,
        }
    }

    /// Also publish [`AuthEvent`]s on `events`.
    pub fn with_events(mut self, events: EventBus<CoreEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Creates an idle flow and registers its routes.
    pub fn create(&self, handler: Arc<dyn FlowHandler>) -> Result<AuthFlowController> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let routes = FlowRoutes::for_flow(id);

        for route in routes.all() {
            self.navigator
                .register_route(route)
                .map_err(AuthError::Navigation)?;
        }
        debug!(flow_id = id, "Authentication flow created");

        Ok(AuthFlowController {
            shared: Arc::new(FlowShared {
                id,
                routes,
                navigator: Arc::clone(&self.navigator),
                exchange: Arc::clone(&self.exchange),
                transitions: self.transitions.clone(),
                config: self.config.clone(),
                events: self.events.clone(),
                handler,
                inner: Mutex::new(FlowInner::default()),
            }),
        })
    }
}

#[derive(Default)]
struct Envelope {
    login: Option<String>,
    password: Option<String>,
    attempt: Option<CancellationToken>,
}

impl Envelope {
    fn cancel_attempt(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            attempt.cancel();
        }
    }

    fn clear(&mut self) {
        self.cancel_attempt();
        self.login = None;
        self.password = None;
    }
}

#[derive(Default)]
struct FlowInner {
    state: FlowState,
    envelope: Envelope,
    listener: Option<AbortHandle>,
    destroyed: bool,
}

impl FlowInner {
    fn require(&self, operation: &'static str, allowed: FlowState) -> Result<()> {
        if self.destroyed {
            return Err(AuthError::InvalidState {
                operation,
                state: "destroyed".to_string(),
            });
        }
        if self.state != allowed {
            return Err(AuthError::InvalidState {
                operation,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Back to idle: listener detached, attempt cancelled, envelope wiped.
    fn detach(&mut self) -> FlowState {
        let previous = std::mem::take(&mut self.state);
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.envelope.clear();
        previous
    }
}

struct FlowShared {
    id: u64,
    routes: FlowRoutes,
    navigator: Arc<dyn Navigator>,
    exchange: Arc<dyn CredentialExchange>,
    transitions: EventBus<NavigationTransition>,
    config: FlowConfig,
    events: Option<EventBus<CoreEvent>>,
    handler: Arc<dyn FlowHandler>,
    inner: Mutex<FlowInner>,
}

impl FlowShared {
    fn lock(&self) -> MutexGuard<'_, FlowInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.events {
            bus.broadcast(CoreEvent::Auth(event));
        }
    }

    fn enter_step(&self, step: FlowState) {
        debug!(flow_id = self.id, step = %step, "Authentication step entered");
        self.emit(AuthEvent::StepEntered {
            flow_id: self.id,
            step: step.to_string(),
        });
    }

    fn navigate(&self, route: &str) -> Result<()> {
        let params = RouteParams::from([("flow".to_string(), self.id.to_string())]);
        self.navigator
            .navigate(route, params)
            .map_err(AuthError::Navigation)
    }

    /// Returns to idle and removes the flow's documents from the stack.
    ///
    /// Returns the state the flow was in.
    fn dismiss(&self) -> FlowState {
        let previous = self.lock().detach();
        self.remove_documents();

        if previous != FlowState::Idle {
            info!(flow_id = self.id, from = %previous, "Authentication flow dismissed");
            self.emit(AuthEvent::Dismissed { flow_id: self.id });
        }
        previous
    }

    /// Documents opened for this flow's routes, newest first.
    fn flow_documents(&self) -> Vec<DocumentRef> {
        let mut documents = Vec::new();
        let mut cursor = self.navigator.current_document();
        while let Some(document) = cursor {
            cursor = self.navigator.previous_document(&document);
            if self.routes.contains(&document.route) {
                documents.push(document);
            }
        }
        documents
    }

    fn remove_document(&self, document: &DocumentRef) {
        if let Err(e) = self.navigator.remove_document(document) {
            warn!(flow_id = self.id, document = %document.id, error = %e, "Failed to remove flow document");
        }
    }

    /// Walks back from the current document, removing every document opened
    /// for one of this flow's routes.
    fn remove_documents(&self) {
        for document in self.flow_documents() {
            self.remove_document(&document);
        }
    }

    /// Removes every flow document except the oldest login document.
    ///
    /// Returns whether a login document is left on the stack.
    fn unwind_to_login(&self) -> bool {
        let mut documents = self.flow_documents();
        let oldest_login = documents
            .iter()
            .rposition(|document| document.route == self.routes.login);
        let login = oldest_login.map(|index| documents.remove(index));

        for document in &documents {
            self.remove_document(document);
        }
        login.is_some()
    }

    fn on_transition(&self, transition: &NavigationTransition) {
        let from = &transition.from;
        let to = &transition.to.route;

        if from.route == self.routes.login && !from.modal && !self.routes.contains(to) {
            if self.dismiss() != FlowState::Idle {
                info!(flow_id = self.id, to = %to, "Authentication aborted by navigation");
                self.report_failure(FlowFailure::abort());
            }
            return;
        }

        if *to == self.routes.login && from.route != self.routes.login && self.routes.contains(&from.route) {
            {
                let mut inner = self.lock();
                if matches!(inner.state, FlowState::Idle | FlowState::Login) {
                    return;
                }
                inner.envelope.cancel_attempt();
                inner.envelope.password = None;
                inner.state = FlowState::Login;
            }
            debug!(flow_id = self.id, "Back at login, starting over");
            self.enter_step(FlowState::Login);
        }
    }

    fn report_failure(&self, failure: FlowFailure) {
        self.emit(AuthEvent::Failed {
            flow_id: self.id,
            kind: failure.kind.to_string(),
        });
        self.handler.on_failure(&failure);
    }

    async fn listen(shared: Weak<Self>, mut transitions: Subscription<NavigationTransition>) {
        while let Some(transition) = transitions.recv().await {
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.on_transition(&transition);
        }
    }

    async fn attempt(self: Arc<Self>, credentials: Credentials, token: CancellationToken) {
        let outcome = core_async::select! {
            _ = token.cancelled() => {
                debug!(flow_id = self.id, "Credential exchange abandoned");
                return;
            }
            outcome = self.exchange.exchange(&credentials) => outcome,
        };
        let verdict = classify(outcome);

        {
            let mut inner = self.lock();
            if token.is_cancelled() || inner.state != FlowState::Authorizing {
                debug!(flow_id = self.id, "Exchange reply arrived after the attempt ended");
                return;
            }
            match verdict {
                Ok(_) => {
                    inner.detach();
                }
                Err(_) => inner.envelope.attempt = None,
            }
        }

        match verdict {
            Ok(payload) => {
                self.remove_documents();
                info!(flow_id = self.id, "Authentication succeeded");
                self.emit(AuthEvent::Succeeded { flow_id: self.id });
                self.emit(AuthEvent::Dismissed { flow_id: self.id });
                self.handler.on_success(&payload);
            }
            Err(failure) => {
                warn!(flow_id = self.id, kind = %failure.kind, "Authentication failed");
                self.report_failure(failure);
            }
        }
    }
}

fn classify(outcome: std::result::Result<Value, RequestError>) -> std::result::Result<AuthPayload, FlowFailure> {
    let reply = outcome.map_err(|e| FlowFailure::new(FailureKind::BadResponse, e.to_string()))?;
    let payload: AuthPayload = serde_json::from_value(reply).map_err(|e| {
        FlowFailure::new(FailureKind::BadResponse, format!("Unreadable reply: {}", e))
    })?;

    if !payload.ok {
        let message = payload
            .message
            .unwrap_or_else(|| "Credentials rejected".to_string());
        return Err(FlowFailure::new(FailureKind::BadCredentials, message));
    }
    if payload.token.is_none() {
        return Err(FlowFailure::new(
            FailureKind::BadResponse,
            "Reply granted access without a token",
        ));
    }
    Ok(payload)
}

/// One authentication flow.
///
/// Cloning yields another handle to the same flow.
#[derive(Clone)]
pub struct AuthFlowController {
    shared: Arc<FlowShared>,
}

impl AuthFlowController {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn routes(&self) -> &FlowRoutes {
        &self.shared.routes
    }

    pub fn state(&self) -> FlowState {
        self.shared.lock().state
    }

    /// Shows the login step. Only legal while idle.
    pub fn present(&self) -> Result<()> {
        {
            let mut inner = self.shared.lock();
            inner.require("present", FlowState::Idle)?;
            inner.envelope.clear();
            inner.state = FlowState::Login;

            let subscription = self.shared.transitions.subscribe();
            let listener = task::spawn(FlowShared::listen(Arc::downgrade(&self.shared), subscription));
            inner.listener = Some(listener.abort_handle());
        }

        info!(flow_id = self.shared.id, "Authentication flow presented");
        self.shared.emit(AuthEvent::Presented {
            flow_id: self.shared.id,
        });
        self.shared.enter_step(FlowState::Login);

        if let Err(e) = self.shared.navigate(&self.shared.routes.login) {
            self.shared.lock().detach();
            return Err(e);
        }
        Ok(())
    }

    /// Records the login and moves to the password step.
    pub fn submit_login(&self, login: impl Into<String>) -> Result<()> {
        let login = login.into();
        {
            let mut inner = self.shared.lock();
            inner.require("submit a login", FlowState::Login)?;
            if login.trim().is_empty() {
                return Err(AuthError::Validation("Login cannot be empty".to_string()));
            }
            inner.envelope.login = Some(login);
            inner.state = FlowState::Password;
        }

        self.shared.enter_step(FlowState::Password);
        self.shared.navigate(&self.shared.routes.password)
    }

    /// Records the secret and starts the credential exchange.
    ///
    /// Secrets no longer than the configured minimum are rejected without
    /// leaving the password step.
    pub fn submit_password(&self, secret: impl Into<String>) -> Result<()> {
        let secret = secret.into();
        let min = self.shared.config.min_secret_length;

        let (credentials, token) = {
            let mut inner = self.shared.lock();
            inner.require("submit a password", FlowState::Password)?;
            if secret.chars().count() <= min {
                return Err(AuthError::Validation(format!(
                    "Password must be longer than {} characters",
                    min
                )));
            }
            let Some(login) = inner.envelope.login.clone() else {
                return Err(AuthError::InvalidState {
                    operation: "submit a password",
                    state: "missing login".to_string(),
                });
            };

            let token = CancellationToken::new();
            inner.envelope.password = Some(secret.clone());
            inner.envelope.attempt = Some(token.clone());
            inner.state = FlowState::Authorizing;
            (Credentials::new(login, secret), token)
        };

        self.shared.enter_step(FlowState::Authorizing);
        if let Err(e) = self.shared.navigate(&self.shared.routes.authorizing) {
            let mut inner = self.shared.lock();
            inner.envelope.cancel_attempt();
            inner.envelope.password = None;
            inner.state = FlowState::Password;
            return Err(e);
        }
        task::spawn(FlowShared::attempt(Arc::clone(&self.shared), credentials, token));
        Ok(())
    }

    /// Goes back to the login step from any active step.
    pub fn reset(&self) -> Result<()> {
        {
            let mut inner = self.shared.lock();
            if inner.destroyed || inner.state == FlowState::Idle {
                return Err(AuthError::InvalidState {
                    operation: "reset",
                    state: if inner.destroyed {
                        "destroyed".to_string()
                    } else {
                        inner.state.to_string()
                    },
                });
            }
            inner.envelope.clear();
            inner.state = FlowState::Login;
        }

        self.shared.enter_step(FlowState::Login);
        if self.shared.unwind_to_login() {
            return Ok(());
        }
        self.shared.navigate(&self.shared.routes.login)
    }

    /// Returns to idle and removes the flow's documents. Legal in any state.
    pub fn dismiss(&self) {
        self.shared.dismiss();
    }

    /// Dismisses the flow and unregisters its routes. The flow cannot be
    /// presented again.
    pub fn destroy(&self) {
        {
            let mut inner = self.shared.lock();
            inner.detach();
            inner.destroyed = true;
        }
        self.shared.remove_documents();

        for route in self.shared.routes.all() {
            if let Err(e) = self.shared.navigator.unregister_route(route) {
                warn!(flow_id = self.shared.id, route, error = %e, "Failed to unregister route");
            }
        }
        debug!(flow_id = self.shared.id, "Authentication flow destroyed");
    }
}

impl fmt::Debug for AuthFlowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("AuthFlowController")
            .field("id", &self.shared.id)
            .field("state", &inner.state)
            .field("login", &inner.envelope.login)
            .field("destroyed", &inner.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::InMemoryNavigator;
    use core_async::sync::oneshot;
    use mockall::mock;
    use serde_json::json;

    mock! {
        Handler {}

        impl FlowHandler for Handler {
            fn on_success(&self, payload: &AuthPayload);
            fn on_failure(&self, failure: &FlowFailure);
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        successes: Mutex<Vec<AuthPayload>>,
        failures: Mutex<Vec<FlowFailure>>,
    }

    impl FlowHandler for RecordingHandler {
        fn on_success(&self, payload: &AuthPayload) {
            self.successes.lock().unwrap().push(payload.clone());
        }

        fn on_failure(&self, failure: &FlowFailure) {
            self.failures.lock().unwrap().push(failure.clone());
        }
    }

    impl RecordingHandler {
        fn failure_kinds(&self) -> Vec<FailureKind> {
            self.failures.lock().unwrap().iter().map(|f| f.kind).collect()
        }
    }

    /// Replies with `reply`, optionally holding it until the gate opens.
    struct ScriptedExchange {
        reply: Mutex<std::result::Result<Value, RequestError>>,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
        calls: Mutex<Vec<Credentials>>,
    }

    impl ScriptedExchange {
        fn replying(reply: std::result::Result<Value, RequestError>) -> Self {
            Self {
                reply: Mutex::new(reply),
                gate: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn gated(reply: std::result::Result<Value, RequestError>) -> (Self, oneshot::Sender<()>) {
            let (open, gate) = oneshot::channel();
            let exchange = Self::replying(reply);
            *exchange.gate.lock().unwrap() = Some(gate);
            (exchange, open)
        }
    }

    #[async_trait]
    impl CredentialExchange for ScriptedExchange {
        async fn exchange(&self, credentials: &Credentials) -> std::result::Result<Value, RequestError> {
            self.calls.lock().unwrap().push(credentials.clone());
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.reply.lock().unwrap().clone()
        }
    }

    struct Fixture {
        navigator: Arc<InMemoryNavigator>,
        transitions: EventBus<NavigationTransition>,
        flows: AuthFlows,
    }

    impl Fixture {
        fn new(exchange: Arc<dyn CredentialExchange>) -> Self {
            let navigator = Arc::new(InMemoryNavigator::new());
            navigator.register_route("catalog").unwrap();
            navigator.navigate("catalog", RouteParams::new()).unwrap();

            let transitions = EventBus::new();
            let flows = AuthFlows::new(
                navigator.clone(),
                exchange,
                transitions.clone(),
                FlowConfig::default(),
            );
            Self {
                navigator,
                transitions,
                flows,
            }
        }

        fn transition(&self, from: &str, modal: bool, to: &str) {
            self.transitions
                .broadcast(NavigationTransition::new(from, modal, to));
        }
    }

    fn granted() -> Value {
        json!({"ok": true, "token": "t-123", "till": 1_900_000_000, "login": "alice"})
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_end_to_end_success() {
        let exchange = Arc::new(ScriptedExchange::replying(Ok(granted())));
        let fixture = Fixture::new(exchange.clone());
        let handler = Arc::new(RecordingHandler::default());
        let flow = fixture.flows.create(handler.clone()).unwrap();

        flow.present().unwrap();
        assert_eq!(flow.state(), FlowState::Login);
        assert_eq!(fixture.navigator.stack_routes(), vec!["catalog", "login-1"]);

        flow.submit_login("alice").unwrap();
        assert_eq!(flow.state(), FlowState::Password);

        flow.submit_password("secret1").unwrap();
        assert_eq!(flow.state(), FlowState::Authorizing);
        settle().await;

        let successes = handler.successes.lock().unwrap();
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].token.as_deref(), Some("t-123"));
        assert_eq!(successes[0].login.as_deref(), Some("alice"));
        assert!(handler.failures.lock().unwrap().is_empty());

        assert_eq!(exchange.calls.lock().unwrap()[0], Credentials::new("alice", "secret1"));
        assert_eq!(flow.state(), FlowState::Idle);
        assert_eq!(fixture.navigator.stack_routes(), vec!["catalog"]);
    }

    #[tokio::test]
    async fn test_present_twice_is_invalid() {
        let fixture = Fixture::new(Arc::new(ScriptedExchange::replying(Ok(granted()))));
        let mut handler = MockHandler::new();
        handler.expect_on_success().never();
        handler.expect_on_failure().never();
        let flow = fixture.flows.create(Arc::new(handler)).unwrap();

        flow.present().unwrap();
        let second = flow.present();

        assert!(matches!(
            second,
            Err(AuthError::InvalidState { operation: "present", .. })
        ));
        assert_eq!(flow.state(), FlowState::Login);
    }

    #[tokio::test]
    async fn test_steps_out_of_order_are_invalid() {
        let fixture = Fixture::new(Arc::new(ScriptedExchange::replying(Ok(granted()))));
        let flow = fixture.flows.create(Arc::new(RecordingHandler::default())).unwrap();

        assert!(matches!(flow.submit_login("alice"), Err(AuthError::InvalidState { .. })));
        assert!(matches!(flow.reset(), Err(AuthError::InvalidState { .. })));

        flow.present().unwrap();
        assert!(matches!(flow.submit_password("secret1"), Err(AuthError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_short_password_is_rejected() {
        let exchange = Arc::new(ScriptedExchange::replying(Ok(granted())));
        let fixture = Fixture::new(exchange.clone());
        let flow = fixture.flows.create(Arc::new(RecordingHandler::default())).unwrap();

        flow.present().unwrap();
        flow.submit_login("alice").unwrap();

        assert!(matches!(flow.submit_password("12345"), Err(AuthError::Validation(_))));
        assert_eq!(flow.state(), FlowState::Password);
        settle().await;
        assert!(exchange.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_back_out_of_login_aborts() {
        let fixture = Fixture::new(Arc::new(ScriptedExchange::replying(Ok(granted()))));
        let handler = Arc::new(RecordingHandler::default());
        let flow = fixture.flows.create(handler.clone()).unwrap();

        flow.present().unwrap();
        settle().await;
        fixture.transition("login-1", false, "catalog");
        settle().await;

        assert_eq!(handler.failure_kinds(), vec![FailureKind::Abort]);
        assert_eq!(flow.state(), FlowState::Idle);
        assert_eq!(fixture.navigator.stack_routes(), vec!["catalog"]);

        // The listener is gone; further transitions are ignored.
        fixture.transition("login-1", false, "catalog");
        settle().await;
        assert_eq!(handler.failure_kinds(), vec![FailureKind::Abort]);
    }

    #[tokio::test]
    async fn test_modal_over_login_does_not_abort() {
        let fixture = Fixture::new(Arc::new(ScriptedExchange::replying(Ok(granted()))));
        let handler = Arc::new(RecordingHandler::default());
        let flow = fixture.flows.create(handler.clone()).unwrap();

        flow.present().unwrap();
        fixture.transition("login-1", true, "catalog");
        fixture.transition("login-1", false, "password-1");
        settle().await;

        assert!(handler.failure_kinds().is_empty());
        assert_eq!(flow.state(), FlowState::Login);
    }

    #[tokio::test]
    async fn test_back_to_login_starts_over() {
        let (exchange, gate) = ScriptedExchange::gated(Ok(granted()));
        let fixture = Fixture::new(Arc::new(exchange));
        let handler = Arc::new(RecordingHandler::default());
        let flow = fixture.flows.create(handler.clone()).unwrap();

        flow.present().unwrap();
        flow.submit_login("alice").unwrap();
        flow.submit_password("secret1").unwrap();
        settle().await;

        fixture.transition("authorizing-1", false, "login-1");
        settle().await;
        // The superseded exchange now replies; its grant must be dropped.
        let _ = gate.send(());
        settle().await;

        assert_eq!(flow.state(), FlowState::Login);
        assert!(handler.failure_kinds().is_empty());
        assert!(handler.successes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abort_supersedes_in_flight_exchange() {
        let (exchange, gate) = ScriptedExchange::gated(Ok(granted()));
        let fixture = Fixture::new(Arc::new(exchange));
        let handler = Arc::new(RecordingHandler::default());
        let flow = fixture.flows.create(handler.clone()).unwrap();

        flow.present().unwrap();
        flow.submit_login("alice").unwrap();
        flow.submit_password("secret1").unwrap();
        settle().await;

        fixture.transition("login-1", false, "catalog");
        settle().await;
        let _ = gate.send(());
        settle().await;

        assert_eq!(handler.failure_kinds(), vec![FailureKind::Abort]);
        assert!(handler.successes.lock().unwrap().is_empty());
        assert_eq!(flow.state(), FlowState::Idle);
    }

    #[tokio::test]
    async fn test_rejected_credentials_stay_authorizing() {
        let reply = json!({"ok": false, "message": "wrong password"});
        let fixture = Fixture::new(Arc::new(ScriptedExchange::replying(Ok(reply))));
        let handler = Arc::new(RecordingHandler::default());
        let flow = fixture.flows.create(handler.clone()).unwrap();

        flow.present().unwrap();
        flow.submit_login("alice").unwrap();
        flow.submit_password("secret1").unwrap();
        settle().await;

        let failures = handler.failures.lock().unwrap().clone();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::BadCredentials);
        assert_eq!(failures[0].message, "wrong password");
        assert_eq!(flow.state(), FlowState::Authorizing);

        flow.reset().unwrap();
        assert_eq!(flow.state(), FlowState::Login);
        assert_eq!(fixture.navigator.stack_routes(), vec!["catalog", "login-1"]);
    }

    #[tokio::test]
    async fn test_back_after_reset_leaves_flow() {
        let reply = json!({"ok": false, "message": "wrong password"});
        let fixture = Fixture::new(Arc::new(ScriptedExchange::replying(Ok(reply))));
        let handler = Arc::new(RecordingHandler::default());
        let flow = fixture.flows.create(handler.clone()).unwrap();

        flow.present().unwrap();
        flow.submit_login("alice").unwrap();
        flow.submit_password("secret1").unwrap();
        settle().await;
        flow.reset().unwrap();

        // Back from the login document goes straight to the host screen.
        fixture.transition("login-1", false, "catalog");
        settle().await;

        assert_eq!(
            handler.failure_kinds(),
            vec![FailureKind::BadCredentials, FailureKind::Abort]
        );
        assert_eq!(flow.state(), FlowState::Idle);
        assert_eq!(fixture.navigator.stack_routes(), vec!["catalog"]);
    }

    #[tokio::test]
    async fn test_reset_from_password_reuses_login_document() {
        let fixture = Fixture::new(Arc::new(ScriptedExchange::replying(Ok(granted()))));
        let flow = fixture.flows.create(Arc::new(RecordingHandler::default())).unwrap();

        flow.present().unwrap();
        flow.submit_login("alice").unwrap();
        assert_eq!(
            fixture.navigator.stack_routes(),
            vec!["catalog", "login-1", "password-1"]
        );

        flow.reset().unwrap();
        assert_eq!(flow.state(), FlowState::Login);
        assert_eq!(fixture.navigator.stack_routes(), vec!["catalog", "login-1"]);
    }

    #[tokio::test]
    async fn test_login_step_entered_once_after_reset() {
        let reply = json!({"ok": false, "message": "wrong password"});
        let navigator = Arc::new(InMemoryNavigator::new());
        let transitions = EventBus::new();
        let bus: EventBus<CoreEvent> = EventBus::new();
        let flows = AuthFlows::new(
            navigator,
            Arc::new(ScriptedExchange::replying(Ok(reply))),
            transitions.clone(),
            FlowConfig::default(),
        )
        .with_events(bus.clone());
        let handler = Arc::new(RecordingHandler::default());
        let flow = flows.create(handler.clone()).unwrap();

        flow.present().unwrap();
        flow.submit_login("alice").unwrap();
        flow.submit_password("secret1").unwrap();
        settle().await;

        let mut events = bus.subscribe();
        flow.reset().unwrap();
        // The host still reports the pop it observed.
        transitions.broadcast(NavigationTransition::new("authorizing-1", false, "login-1"));
        settle().await;

        let mut login_steps = 0;
        while let Some(event) = events.try_recv() {
            if let CoreEvent::Auth(AuthEvent::StepEntered { step, .. }) = event {
                if step == "login" {
                    login_steps += 1;
                }
            }
        }
        assert_eq!(login_steps, 1);
        assert_eq!(flow.state(), FlowState::Login);
        assert_eq!(handler.failure_kinds(), vec![FailureKind::BadCredentials]);
    }

    #[tokio::test]
    async fn test_unusable_replies_are_bad_responses() {
        for reply in [
            Err(RequestError::Transport("offline".to_string())),
            Ok(json!("not an object")),
            Ok(json!({"ok": true})),
        ] {
            let fixture = Fixture::new(Arc::new(ScriptedExchange::replying(reply)));
            let handler = Arc::new(RecordingHandler::default());
            let flow = fixture.flows.create(handler.clone()).unwrap();

            flow.present().unwrap();
            flow.submit_login("alice").unwrap();
            flow.submit_password("secret1").unwrap();
            settle().await;

            assert_eq!(handler.failure_kinds(), vec![FailureKind::BadResponse]);
        }
    }

    #[tokio::test]
    async fn test_dismiss_cleans_stack() {
        let (exchange, _gate) = ScriptedExchange::gated(Ok(granted()));
        let fixture = Fixture::new(Arc::new(exchange));
        let flow = fixture.flows.create(Arc::new(RecordingHandler::default())).unwrap();

        flow.present().unwrap();
        flow.submit_login("alice").unwrap();
        flow.submit_password("secret1").unwrap();
        assert_eq!(
            fixture.navigator.stack_routes(),
            vec!["catalog", "login-1", "password-1", "authorizing-1"]
        );

        flow.dismiss();
        assert_eq!(flow.state(), FlowState::Idle);
        assert_eq!(fixture.navigator.stack_routes(), vec!["catalog"]);

        // Dismissing an idle flow is harmless, and it can be presented again.
        flow.dismiss();
        flow.present().unwrap();
        assert_eq!(flow.state(), FlowState::Login);
    }

    #[tokio::test]
    async fn test_destroy_unregisters_routes() {
        let fixture = Fixture::new(Arc::new(ScriptedExchange::replying(Ok(granted()))));
        let flow = fixture.flows.create(Arc::new(RecordingHandler::default())).unwrap();
        assert!(fixture.navigator.is_registered("password-1"));

        flow.present().unwrap();
        flow.destroy();

        for route in ["login-1", "password-1", "authorizing-1"] {
            assert!(!fixture.navigator.is_registered(route));
        }
        assert!(matches!(flow.present(), Err(AuthError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_flows_get_distinct_routes() {
        let fixture = Fixture::new(Arc::new(ScriptedExchange::replying(Ok(granted()))));
        let first = fixture.flows.create(Arc::new(RecordingHandler::default())).unwrap();
        let second = fixture.flows.create(Arc::new(RecordingHandler::default())).unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(second.routes().login, format!("login-{}", second.id()));
        assert!(!first.routes().contains(&second.routes().login));
    }

    #[tokio::test]
    async fn test_auth_events() {
        let exchange = Arc::new(ScriptedExchange::replying(Ok(granted())));
        let navigator = Arc::new(InMemoryNavigator::new());
        let bus: EventBus<CoreEvent> = EventBus::new();
        let mut events = bus.subscribe();
        let flows = AuthFlows::new(navigator, exchange, EventBus::new(), FlowConfig::default())
            .with_events(bus);
        let flow = flows.create(Arc::new(RecordingHandler::default())).unwrap();

        flow.present().unwrap();
        flow.submit_login("alice").unwrap();
        flow.submit_password("secret1").unwrap();
        settle().await;

        let mut seen = Vec::new();
        while let Some(CoreEvent::Auth(event)) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.first(), Some(&AuthEvent::Presented { flow_id: 1 }));
        assert!(seen.contains(&AuthEvent::Succeeded { flow_id: 1 }));
        assert_eq!(seen.last(), Some(&AuthEvent::Dismissed { flow_id: 1 }));
    }
}

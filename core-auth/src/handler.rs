//! Flow handler that persists granted sessions before notifying the host.

use crate::flow::{FailureKind, FlowFailure, FlowHandler};
use crate::session::SessionStore;
use crate::types::{AuthPayload, SessionPatch};
use std::sync::Arc;
use tracing::{error, info};

/// Writes the granted token into the [`SessionStore`], then forwards to
/// `next`.
///
/// A session that cannot be stored is reported to `next` as a
/// [`FailureKind::BadResponse`] failure instead of a success.
pub struct SessionPersistingHandler {
    session: Arc<SessionStore>,
    next: Arc<dyn FlowHandler>,
}

impl SessionPersistingHandler {
    pub fn new(session: Arc<SessionStore>, next: Arc<dyn FlowHandler>) -> Self {
        Self { session, next }
    }

    fn patch_for(payload: &AuthPayload) -> SessionPatch {
        let mut patch = SessionPatch::new().logged_flag(1);
        if let Some(token) = &payload.token {
            patch = patch.token(token.clone());
        }
        if let Some(till) = payload.till {
            patch = patch.till_timestamp(till);
        }
        if let Some(login) = &payload.login {
            patch = patch.login(login.clone());
        }
        if let Some(members) = &payload.family_members {
            patch = patch.family_members(members.clone());
        }
        patch
    }
}

impl FlowHandler for SessionPersistingHandler {
    fn on_success(&self, payload: &AuthPayload) {
        match self.session.set(Self::patch_for(payload)) {
            Ok(record) => {
                info!(login = ?record.login, "Session stored");
                self.next.on_success(payload);
            }
            Err(e) => {
                error!(error = %e, "Failed to store session");
                self.next.on_failure(&FlowFailure::new(
                    FailureKind::BadResponse,
                    format!("Session could not be stored: {}", e),
                ));
            }
        }
    }

    fn on_failure(&self, failure: &FlowFailure) {
        self.next.on_failure(failure);
    }
}

impl std::fmt::Debug for SessionPersistingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPersistingHandler")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

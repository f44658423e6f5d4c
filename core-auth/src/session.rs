//! Persisted Session Store
//!
//! Single owner of the session record. The record is hydrated once from the
//! host's key/value storage and afterwards changes only through
//! [`SessionStore::set`] and [`SessionStore::clear`].
//!
//! ## Storage layout
//!
//! | Key            | Value                                              |
//! |----------------|----------------------------------------------------|
//! | `session`      | JSON-encoded [`SessionRecord`]                     |
//! | `token`        | raw token string                                   |
//! | `token-expiry` | `tillTimestamp` as a 13-digit Unix millisecond string |
//!
//! ## Notifications
//!
//! Subscribers are notified with the new record only when the derived
//! `authorized` flag flips. `clear` always notifies.

use crate::error::Result;
use crate::types::{normalize_expiry_millis, FamilyMember, SessionPatch, SessionRecord};
use bridge_traits::{Clock, KeyValueStore};
use core_request::RequestHeaders;
use core_runtime::events::{CoreEvent, EventBus, SessionEvent, Subscription};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

pub const SESSION_KEY: &str = "session";
pub const TOKEN_KEY: &str = "token";
pub const TOKEN_EXPIRY_KEY: &str = "token-expiry";

pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    record: Mutex<SessionRecord>,
    changes: EventBus<SessionRecord>,
    events: Option<EventBus<CoreEvent>>,
}

impl SessionStore {
    /// Hydrates the session from `store`.
    ///
    /// Missing or undecodable data yields an empty record; corrupt data is
    /// removed so the next start is clean.
    pub fn load(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let record = Self::read_record(store.as_ref());
        debug!(authorized = record.is_authorized(), "Session hydrated");

        Self {
            store,
            clock,
            record: Mutex::new(record),
            changes: EventBus::new(),
            events: None,
        }
    }

    /// Also publish [`SessionEvent`]s on `events`.
    pub fn with_events(mut self, events: EventBus<CoreEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn read_record(store: &dyn KeyValueStore) -> SessionRecord {
        let raw = match store.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return SessionRecord::default(),
            Err(e) => {
                warn!(error = %e, "Session storage unreadable, starting signed out");
                return SessionRecord::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Discarding corrupt session record");
                if let Err(e) = store.remove(SESSION_KEY) {
                    warn!(error = %e, "Failed to remove corrupt session record");
                }
                SessionRecord::default()
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current record.
    pub fn get(&self) -> SessionRecord {
        self.lock().clone()
    }

    /// Merges `patch` into the record and persists it.
    ///
    /// Merge, persistence and commit happen under one lock, so concurrent
    /// writers never interleave. If persistence fails the in-memory record
    /// is left untouched and the storage error is returned.
    pub fn set(&self, patch: SessionPatch) -> Result<SessionRecord> {
        let mut record = self.lock();
        if patch.is_empty() {
            return Ok(record.clone());
        }

        let updated = patch.apply_to(&record);
        self.persist(&patch, &updated)?;

        let flipped = record.is_authorized() != updated.is_authorized();
        *record = updated.clone();
        debug!(fields = ?patch.fields(), "Session updated");

        if flipped {
            info!(authorized = updated.is_authorized(), "Session authorization changed");
            self.changes.broadcast(updated.clone());
            self.emit(if updated.is_authorized() {
                SessionEvent::Authorized {
                    login: updated.login.clone(),
                }
            } else {
                SessionEvent::Deauthorized
            });
        }

        Ok(updated)
    }

    /// Validates untyped input and applies the accepted fields.
    ///
    /// Unsupported or mistyped fields are dropped with a warning and never
    /// persisted.
    pub fn set_json(&self, input: &Map<String, Value>) -> Result<SessionRecord> {
        let validated = SessionPatch::validate(input);
        for field in &validated.rejected {
            warn!(field = %field, "Dropping unsupported session field");
        }
        self.set(validated.patch)
    }

    /// Writes the session JSON first, then the token keys the patch touches.
    ///
    /// If any write fails, keys already written are restored to their
    /// previous values before the error is returned.
    fn persist(&self, patch: &SessionPatch, record: &SessionRecord) -> Result<()> {
        let mut writes = vec![(SESSION_KEY, Some(serde_json::to_string(record)?))];
        if let Some(token) = &patch.token {
            writes.push((TOKEN_KEY, token.clone()));
        }
        if let Some(till) = &patch.till_timestamp {
            writes.push((
                TOKEN_EXPIRY_KEY,
                till.map(|till| normalize_expiry_millis(till).to_string()),
            ));
        }

        let mut applied: Vec<(&'static str, Option<String>)> = Vec::with_capacity(writes.len());
        for (key, value) in writes {
            let written = self
                .store
                .get(key)
                .and_then(|previous| self.write_key(key, value.as_deref()).map(|()| previous));
            match written {
                Ok(previous) => applied.push((key, previous)),
                Err(e) => {
                    warn!(key, error = %e, "Session write failed, restoring stored keys");
                    self.restore(applied);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn write_key(&self, key: &str, value: Option<&str>) -> bridge_traits::error::Result<()> {
        match value {
            Some(value) => self.store.set(key, value),
            None => self.store.remove(key),
        }
    }

    fn restore(&self, applied: Vec<(&'static str, Option<String>)>) {
        for (key, previous) in applied.into_iter().rev() {
            if let Err(e) = self.write_key(key, previous.as_deref()) {
                warn!(key, error = %e, "Failed to restore session key");
            }
        }
    }

    /// Resets to an empty record and removes every stored key.
    ///
    /// The in-memory record is reset and subscribers are notified even when
    /// storage fails; the first storage error is returned.
    pub fn clear(&self) -> Result<()> {
        let mut record = self.lock();
        *record = SessionRecord::default();

        let mut first_error = None;
        for key in [SESSION_KEY, TOKEN_KEY, TOKEN_EXPIRY_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to remove session key");
                first_error.get_or_insert(e);
            }
        }

        info!("Session cleared");
        self.changes.broadcast(SessionRecord::default());
        self.emit(SessionEvent::Cleared);
        drop(record);

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(bus) = &self.events {
            bus.broadcast(CoreEvent::Session(event));
        }
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn login(&self) -> Option<String> {
        self.lock().login.clone()
    }

    pub fn is_authorized(&self) -> bool {
        self.lock().is_authorized()
    }

    /// Whether the session expiry is still in the future.
    pub fn is_extended(&self) -> bool {
        let expiry = self.lock().expiry_millis();
        expiry.is_some_and(|till| till > self.clock.unix_timestamp_millis())
    }

    pub fn family_members(&self) -> Vec<FamilyMember> {
        self.lock().family_members.clone().unwrap_or_default()
    }

    /// The selected family member, if it is still on the account.
    pub fn selected_member(&self) -> Option<FamilyMember> {
        let record = self.lock();
        let selected = record.selected_member.as_ref()?;
        record
            .family_members
            .as_ref()?
            .iter()
            .find(|member| &member.id == selected)
            .cloned()
    }

    /// Subscribes to authorization changes and clears.
    pub fn subscription(&self) -> Subscription<SessionRecord> {
        self.changes.subscribe()
    }
}

impl RequestHeaders for SessionStore {
    fn headers(&self) -> HashMap<String, String> {
        self.token()
            .map(|token| HashMap::from([("Authorization".to_string(), format!("Bearer {}", token))]))
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("record", &*self.lock())
            .field("subscribers", &self.changes.subscriber_count())
            .finish()
    }
}

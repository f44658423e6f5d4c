use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A profile on a family account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyMember {
    pub id: String,
    pub name: String,
}

impl FamilyMember {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Persisted session.
///
/// Serialized with the camelCase field names hosts already store
/// (`tillTimestamp`, `loggedFlag`, ...). `None` means the field is unset,
/// which is distinct from an explicit `loggedFlag` of `0`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub till_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_flag: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_members: Option<Vec<FamilyMember>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_member: Option<String>,
}

impl SessionRecord {
    /// Derived from `loggedFlag`; never stored on its own.
    pub fn is_authorized(&self) -> bool {
        self.logged_flag.is_some_and(|flag| flag > 0)
    }

    /// Expiry in Unix milliseconds, whatever precision it was written with.
    pub fn expiry_millis(&self) -> Option<i64> {
        self.till_timestamp.map(normalize_expiry_millis)
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("till_timestamp", &self.till_timestamp)
            .field("login", &self.login)
            .field("logged_flag", &self.logged_flag)
            .field("family_members", &self.family_members)
            .field("selected_member", &self.selected_member)
            .finish()
    }
}

/// The fixed set of writable session fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionField {
    Token,
    TillTimestamp,
    Login,
    LoggedFlag,
    FamilyMembers,
    SelectedMember,
}

impl SessionField {
    pub const ALL: [SessionField; 6] = [
        SessionField::Token,
        SessionField::TillTimestamp,
        SessionField::Login,
        SessionField::LoggedFlag,
        SessionField::FamilyMembers,
        SessionField::SelectedMember,
    ];

    /// Name used in persisted JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionField::Token => "token",
            SessionField::TillTimestamp => "tillTimestamp",
            SessionField::Login => "login",
            SessionField::LoggedFlag => "loggedFlag",
            SessionField::FamilyMembers => "familyMembers",
            SessionField::SelectedMember => "selectedMember",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }
}

impl fmt::Display for SessionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partial update of a [`SessionRecord`].
///
/// Each field is `None` when untouched, `Some(None)` to clear it and
/// `Some(Some(value))` to set it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub token: Option<Option<String>>,
    pub till_timestamp: Option<Option<i64>>,
    pub login: Option<Option<String>>,
    pub logged_flag: Option<Option<i64>>,
    pub family_members: Option<Option<Vec<FamilyMember>>>,
    pub selected_member: Option<Option<String>>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(Some(token.into()));
        self
    }

    pub fn till_timestamp(mut self, till: i64) -> Self {
        self.till_timestamp = Some(Some(till));
        self
    }

    pub fn login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(Some(login.into()));
        self
    }

    pub fn logged_flag(mut self, flag: i64) -> Self {
        self.logged_flag = Some(Some(flag));
        self
    }

    pub fn family_members(mut self, members: Vec<FamilyMember>) -> Self {
        self.family_members = Some(Some(members));
        self
    }

    pub fn selected_member(mut self, member_id: impl Into<String>) -> Self {
        self.selected_member = Some(Some(member_id.into()));
        self
    }

    /// Marks `field` to be reset to unset.
    pub fn unset(mut self, field: SessionField) -> Self {
        match field {
            SessionField::Token => self.token = Some(None),
            SessionField::TillTimestamp => self.till_timestamp = Some(None),
            SessionField::Login => self.login = Some(None),
            SessionField::LoggedFlag => self.logged_flag = Some(None),
            SessionField::FamilyMembers => self.family_members = Some(None),
            SessionField::SelectedMember => self.selected_member = Some(None),
        }
        self
    }

    /// Fields this patch writes.
    pub fn fields(&self) -> Vec<SessionField> {
        let touched = [
            self.token.is_some(),
            self.till_timestamp.is_some(),
            self.login.is_some(),
            self.logged_flag.is_some(),
            self.family_members.is_some(),
            self.selected_member.is_some(),
        ];
        SessionField::ALL
            .into_iter()
            .zip(touched)
            .filter_map(|(field, touched)| touched.then_some(field))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Returns `record` with this patch merged over it.
    pub fn apply_to(&self, record: &SessionRecord) -> SessionRecord {
        fn merge<T: Clone>(current: &Option<T>, update: &Option<Option<T>>) -> Option<T> {
            match update {
                Some(value) => value.clone(),
                None => current.clone(),
            }
        }

        SessionRecord {
            token: merge(&record.token, &self.token),
            till_timestamp: merge(&record.till_timestamp, &self.till_timestamp),
            login: merge(&record.login, &self.login),
            logged_flag: merge(&record.logged_flag, &self.logged_flag),
            family_members: merge(&record.family_members, &self.family_members),
            selected_member: merge(&record.selected_member, &self.selected_member),
        }
    }

    /// Builds a patch from untyped input.
    ///
    /// Unknown field names and known fields holding a value of the wrong type
    /// are reported in [`ValidatedPatch::rejected`]; `null` unsets a field.
    pub fn validate(input: &Map<String, Value>) -> ValidatedPatch {
        let mut patch = SessionPatch::new();
        let mut rejected = Vec::new();

        for (name, value) in input {
            let Some(field) = SessionField::parse(name) else {
                rejected.push(name.clone());
                continue;
            };

            if value.is_null() {
                patch = patch.unset(field);
                continue;
            }

            let accepted = match field {
                SessionField::Token => value.as_str().map(|v| patch.token = Some(Some(v.to_string()))),
                SessionField::TillTimestamp => {
                    parse_integer(value).map(|v| patch.till_timestamp = Some(Some(v)))
                }
                SessionField::Login => value.as_str().map(|v| patch.login = Some(Some(v.to_string()))),
                SessionField::LoggedFlag => {
                    parse_flag(value).map(|v| patch.logged_flag = Some(Some(v)))
                }
                SessionField::FamilyMembers => serde_json::from_value::<Vec<FamilyMember>>(value.clone())
                    .ok()
                    .map(|v| patch.family_members = Some(Some(v))),
                SessionField::SelectedMember => {
                    parse_member_id(value).map(|v| patch.selected_member = Some(Some(v)))
                }
            };

            if accepted.is_none() {
                rejected.push(name.clone());
            }
        }

        ValidatedPatch { patch, rejected }
    }
}

/// Outcome of [`SessionPatch::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedPatch {
    pub patch: SessionPatch,
    /// Names of the input fields that were dropped
    pub rejected: Vec<String>,
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integers are kept as-is; any other positive number counts as set.
fn parse_flag(value: &Value) -> Option<i64> {
    if let Value::Bool(b) = value {
        return Some(i64::from(*b));
    }
    if let Some(flag) = parse_integer(value) {
        return Some(flag);
    }
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then(|| i64::from(number > 0.0))
}

fn parse_member_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

const MILLIS_DIGITS: u32 = 13;

/// Brings an expiry timestamp to 13-digit Unix millisecond precision.
///
/// Shorter values (seconds) are padded with zeros, longer ones
/// (micro/nanoseconds) truncated. Non-positive values become `0`.
///
/// ```
/// use core_auth::normalize_expiry_millis;
///
/// assert_eq!(normalize_expiry_millis(1_700_000_000), 1_700_000_000_000);
/// assert_eq!(normalize_expiry_millis(1_700_000_000_123_456), 1_700_000_000_123);
/// ```
pub fn normalize_expiry_millis(timestamp: i64) -> i64 {
    if timestamp <= 0 {
        return 0;
    }

    let digits = timestamp.ilog10() + 1;
    if digits < MILLIS_DIGITS {
        timestamp.saturating_mul(10_i64.pow(MILLIS_DIGITS - digits))
    } else {
        timestamp / 10_i64.pow(digits - MILLIS_DIGITS)
    }
}

/// Login and password collected by an authentication flow.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Reply of the credential exchange endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub ok: bool,
    #[serde(default)]
    pub token: Option<String>,
    /// Session expiry, any Unix precision
    #[serde(default)]
    pub till: Option<i64>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub family_members: Option<Vec<FamilyMember>>,
    /// Server-provided reason on rejection
    #[serde(default)]
    pub message: Option<String>,
}

impl AuthPayload {
    /// Successful payload carrying a token.
    pub fn granted(token: impl Into<String>, till: i64, login: impl Into<String>) -> Self {
        Self {
            ok: true,
            token: Some(token.into()),
            till: Some(till),
            login: Some(login.into()),
            family_members: None,
            message: None,
        }
    }
}

impl fmt::Debug for AuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPayload")
            .field("ok", &self.ok)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("till", &self.till)
            .field("login", &self.login)
            .field("family_members", &self.family_members)
            .field("message", &self.message)
            .finish()
    }
}

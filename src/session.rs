//! Per-virtual-user session state.
//!
//! A `SessionState` is owned by exactly one virtual user and mutated in place
//! by the actions in [`crate::actions`]. Nothing in here is shared.

use crate::constants::{DEFAULT_PASSWORD, EMAIL_DOMAIN, EMAIL_ENTROPY_CHARS};
use serde_json::Value;
use std::collections::BTreeMap;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Identity template a session is created from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Local-part prefix, `test` or `client`
    pub email_prefix: &'static str,
    /// Sent as `prenom`
    pub first_name: String,
    /// Sent as `nom`
    pub last_name: String,
}

impl Identity {
    /// Identity used by the auth and smoke scenarios (`nom: John`, `prenom: Doe`)
    pub fn auth_tester() -> Self {
        Self {
            email_prefix: "test",
            first_name: "Doe".to_string(),
            last_name: "John".to_string(),
        }
    }

    /// Identity used by the profile scenario
    pub fn profile_client() -> Self {
        Self {
            email_prefix: "client",
            first_name: "Jean".to_string(),
            last_name: "Dupont".to_string(),
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::auth_tester()
    }
}

/// Build a fresh `<prefix>_<8 hex>@example.com` address
pub fn generate_email(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}@{}",
        prefix,
        &hex[..EMAIL_ENTROPY_CHARS],
        EMAIL_DOMAIN
    )
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub identity: Identity,
    pub email: String,
    pub password: String,
    pub registered: bool,
    auth_token: Option<String>,
    auth_headers: BTreeMap<String, String>,
    /// Last profile returned by `/api/utilisateur/me`
    pub user_data: Option<Value>,
}

impl SessionState {
    pub fn new(identity: Identity) -> Self {
        let email = generate_email(identity.email_prefix);
        Self::with_email(identity, email)
    }

    /// Session with a caller-chosen email, used for deterministic scripts
    pub fn with_email(identity: Identity, email: impl Into<String>) -> Self {
        Self {
            identity,
            email: email.into(),
            password: DEFAULT_PASSWORD.to_string(),
            registered: false,
            auth_token: None,
            auth_headers: BTreeMap::new(),
            user_data: None,
        }
    }

    /// Start over as a new account: fresh email, nothing registered or
    /// cached. The new address always differs from the current one.
    pub fn regenerate_email(&mut self) -> &str {
        loop {
            let candidate = generate_email(self.identity.email_prefix);
            if candidate != self.email {
                self.email = candidate;
                break;
            }
        }
        self.registered = false;
        self.auth_token = None;
        self.auth_headers.clear();
        self.user_data = None;
        &self.email
    }

    pub fn mark_registered(&mut self) {
        self.registered = true;
    }

    /// Store the login token and derive the bearer header set.
    ///
    /// Returns `false` and leaves the session untouched when the user has
    /// not registered yet.
    pub fn authenticate(&mut self, token: impl Into<String>) -> bool {
        if !self.registered {
            return false;
        }
        let token = token.into();
        self.auth_headers = BTreeMap::from([
            (
                AUTHORIZATION_HEADER.to_string(),
                format!("Bearer {}", token),
            ),
            (
                CONTENT_TYPE_HEADER.to_string(),
                JSON_CONTENT_TYPE.to_string(),
            ),
        ]);
        self.auth_token = Some(token);
        true
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_token.is_some()
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Headers every authenticated call carries; empty before login
    pub fn auth_headers(&self) -> &BTreeMap<String, String> {
        &self.auth_headers
    }

    /// Own numeric id as reported by the cached profile.
    ///
    /// Accepts both a JSON number and a numeric string.
    pub fn cached_user_id(&self) -> Option<String> {
        match self.user_data.as_ref()?.get("id")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

//! Authentication contexts: who the caller is, once credentials check out.
//!
//! Each strategy produces its own context type. Policies are written against
//! the capabilities a context exposes (`ScopedContext` for scope checks), so
//! pairing a scope policy with an API-key strategy does not compile.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a caller was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    None,
    ApiKey,
    OAuth2,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ApiKey => "apikey",
            Self::OAuth2 => "oauth2",
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful authentication. Holds no secret material.
pub trait AuthenticationContext: std::fmt::Debug + Clone + Send + Sync + 'static {
    fn method(&self) -> AuthMethod;

    /// Stable identifier of the caller, when there is one.
    fn principal(&self) -> Option<&str>;

    fn is_authenticated(&self) -> bool {
        true
    }
}

/// Contexts that carry granted scopes.
pub trait ScopedContext: AuthenticationContext {
    fn scopes(&self) -> &[String];

    fn has_scope(&self, scope: &str) -> bool {
        self.scopes().iter().any(|s| s == scope)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Concrete contexts
// ─────────────────────────────────────────────────────────────────────────────

/// Produced when no authentication is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unauthenticated;

impl AuthenticationContext for Unauthenticated {
    #[inline(always)]
    fn method(&self) -> AuthMethod {
        AuthMethod::None
    }

    #[inline(always)]
    fn principal(&self) -> Option<&str> {
        None
    }

    #[inline(always)]
    fn is_authenticated(&self) -> bool {
        false
    }
}

/// Caller identified by an API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyContext {
    /// Name the key was registered under, never the key itself
    pub key_id: String,
    pub attributes: HashMap<String, String>,
}

impl ApiKeyContext {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl AuthenticationContext for ApiKeyContext {
    fn method(&self) -> AuthMethod {
        AuthMethod::ApiKey
    }

    fn principal(&self) -> Option<&str> {
        Some(&self.key_id)
    }
}

/// Caller identified by a validated bearer JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Context {
    pub subject: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub issuer: Option<String>,
    pub client_id: Option<String>,
}

impl OAuth2Context {
    pub fn new(subject: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            scopes,
            expires_at: None,
            issuer: None,
            client_id: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

impl AuthenticationContext for OAuth2Context {
    fn method(&self) -> AuthMethod {
        AuthMethod::OAuth2
    }

    fn principal(&self) -> Option<&str> {
        Some(&self.subject)
    }
}

impl ScopedContext for OAuth2Context {
    fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

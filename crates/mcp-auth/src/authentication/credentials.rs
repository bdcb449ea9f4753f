//! Transport-level credential lookup.
//!
//! Strategies only ever see this view of a request: headers and query
//! parameters. The JSON-RPC body is never available here.

use std::collections::HashMap;

/// Read access to the credential-bearing parts of an inbound request.
pub trait CredentialSource: Send + Sync {
    /// Header value by name, case-insensitive.
    fn header(&self, name: &str) -> Option<&str>;

    /// Query parameter value by exact name.
    fn query_param(&self, name: &str) -> Option<&str>;

    /// Whether an `Authorization` header is present at all.
    fn has_authorization(&self) -> bool {
        self.header("authorization").is_some()
    }

    /// Token from `Authorization: Bearer <token>`.
    fn bearer_token(&self) -> Option<&str> {
        parse_bearer(self.header("authorization")?)
    }
}

/// Extract the token from a bearer `Authorization` value.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Owned credential bag for non-HTTP callers and tests.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::new().with_header("authorization", format!("Bearer {}", token.as_ref()))
    }
}

impl CredentialSource for Credentials {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer   abc "), Some("abc"));
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("Bearer"), None);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let creds = Credentials::new().with_header("X-API-Key", "k");
        assert_eq!(creds.header("x-api-key"), Some("k"));
        assert_eq!(creds.header("X-Api-Key"), Some("k"));
        assert!(!creds.has_authorization());
    }
}

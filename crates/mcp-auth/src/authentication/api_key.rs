//! API key authentication.
//!
//! Keys are looked up in a configured header, then an optional query
//! parameter, then (optionally) `Authorization: Bearer`. The in-memory
//! validator keeps only SHA-256 digests of registered keys.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::context::{ApiKeyContext, AuthMethod};
use super::credentials::CredentialSource;
use super::strategy::AuthenticationStrategy;
use crate::error::{AuthenticationError, AuthenticationResult};

/// Where API keys are read from.
#[derive(Debug, Clone)]
pub struct ApiKeyConfig {
    /// Header carrying the key (default: `x-api-key`)
    pub header_name: String,
    /// Query parameter carrying the key, if allowed
    pub query_param: Option<String>,
    /// Also accept the key as a bearer token
    pub allow_bearer: bool,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            header_name: "x-api-key".into(),
            query_param: None,
            allow_bearer: true,
        }
    }
}

/// Decides whether a presented key is valid.
pub trait ApiKeyValidator: Send + Sync + 'static {
    fn validate(&self, key: &str) -> impl Future<Output = AuthenticationResult<ApiKeyContext>> + Send;
}

/// Validator backed by a fixed table of key digests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryApiKeyValidator {
    keys: Arc<HashMap<String, ApiKeyContext>>,
}

impl InMemoryApiKeyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key. Only its digest is retained.
    pub fn with_key(mut self, key: &SecretString, context: ApiKeyContext) -> Self {
        Arc::make_mut(&mut self.keys).insert(digest(key.expose_secret()), context);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl ApiKeyValidator for InMemoryApiKeyValidator {
    fn validate(&self, key: &str) -> impl Future<Output = AuthenticationResult<ApiKeyContext>> + Send {
        let result = self
            .keys
            .get(&digest(key))
            .cloned()
            .ok_or_else(|| AuthenticationError::Invalid("unknown api key".into()));
        std::future::ready(result)
    }
}

fn digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// API key strategy over any validator.
#[derive(Debug, Clone)]
pub struct ApiKeyStrategy<V> {
    validator: V,
    config: ApiKeyConfig,
}

impl<V: ApiKeyValidator> ApiKeyStrategy<V> {
    pub fn new(validator: V) -> Self {
        Self::with_config(validator, ApiKeyConfig::default())
    }

    pub fn with_config(validator: V, config: ApiKeyConfig) -> Self {
        Self { validator, config }
    }

    pub fn config(&self) -> &ApiKeyConfig {
        &self.config
    }

    /// The first key the request presents, checking sources in order.
    fn locate<'a, C>(&self, credentials: &'a C) -> AuthenticationResult<&'a str>
    where
        C: CredentialSource + ?Sized,
    {
        if let Some(key) = credentials.header(&self.config.header_name) {
            return Ok(key);
        }
        if let Some(key) = self
            .config
            .query_param
            .as_deref()
            .and_then(|name| credentials.query_param(name))
        {
            return Ok(key);
        }
        if self.config.allow_bearer && credentials.has_authorization() {
            return credentials
                .bearer_token()
                .ok_or_else(|| AuthenticationError::Malformed("authorization is not a bearer token".into()));
        }
        Err(AuthenticationError::Missing)
    }
}

impl<V: ApiKeyValidator> AuthenticationStrategy for ApiKeyStrategy<V> {
    type Context = ApiKeyContext;

    fn method(&self) -> AuthMethod {
        AuthMethod::ApiKey
    }

    async fn authenticate<C>(&self, credentials: &C) -> AuthenticationResult<ApiKeyContext>
    where
        C: CredentialSource + ?Sized,
    {
        let key = self.locate(credentials)?.trim();
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            return Err(AuthenticationError::Malformed("api key is empty or contains whitespace".into()));
        }
        let context = self.validator.validate(key).await?;
        debug!(key_id = %context.key_id, "API key accepted");
        Ok(context)
    }

    fn challenge(&self) -> Option<String> {
        self.config.allow_bearer.then(|| "Bearer".to_string())
    }
}

//! Protected resource metadata (RFC 9728), served so clients can discover
//! the token issuer and scopes without out-of-band configuration.

use serde::{Deserialize, Serialize};

use super::config::OAuth2Config;
use crate::authorization::ScopeRequirements;

/// Well-known path the metadata document is served from.
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
}

impl ProtectedResourceMetadata {
    pub fn new(resource: impl Into<String>, authorization_server: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: vec![authorization_server.into()],
            scopes_supported: Vec::new(),
            bearer_methods_supported: vec!["header".into()],
            jwks_uri: None,
            resource_documentation: None,
        }
    }

    /// Metadata for a resource validated with `config`, advertising every
    /// scope `requirements` can ask for.
    pub fn from_config(config: &OAuth2Config, requirements: &ScopeRequirements) -> Self {
        Self {
            jwks_uri: config.jwks_url.clone(),
            scopes_supported: requirements.all_scopes(),
            ..Self::new(config.audience.clone(), config.issuer.clone())
        }
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes_supported = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_documentation(mut self, url: impl Into<String>) -> Self {
        self.resource_documentation = Some(url.into());
        self
    }
}

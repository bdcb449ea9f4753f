use std::time::Duration;

use jsonwebtoken::Algorithm;

/// Resource-server side OAuth2 settings.
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    /// Expected `iss` claim
    pub issuer: String,
    /// Expected `aud` claim (this resource's identifier)
    pub audience: String,
    /// Accepted signing algorithms
    pub algorithms: Vec<Algorithm>,
    /// Clock skew tolerance for `exp`/`nbf`
    pub leeway: Duration,
    /// Where the issuer publishes its key set
    pub jwks_url: Option<String>,
    /// How long a fetched key set is considered fresh
    pub key_set_ttl: Duration,
    /// Timeout for one key set fetch
    pub fetch_timeout: Duration,
    /// Advertised in the `WWW-Authenticate` challenge when set
    pub resource_metadata_url: Option<String>,
}

impl OAuth2Config {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            ..Default::default()
        }
    }
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            audience: String::new(),
            algorithms: vec![Algorithm::RS256],
            leeway: Duration::from_secs(60),
            jwks_url: None,
            key_set_ttl: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(10),
            resource_metadata_url: None,
        }
    }
}

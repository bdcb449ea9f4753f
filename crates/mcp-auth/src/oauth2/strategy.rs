//! Bearer JWT validation.

use std::future::Future;

use chrono::DateTime;
use jsonwebtoken::{Validation, decode, decode_header};
use serde::Deserialize;
use tracing::debug;

use super::config::OAuth2Config;
use super::error::{OAuth2Error, classify};
use super::jwks::KeySetSource;
use crate::authentication::{
    AuthMethod, AuthenticationStrategy, CredentialSource, OAuth2Context,
};
use crate::error::{AuthenticationError, AuthenticationResult};

/// Claims read from an access token. Signature, `iss`, `aud`, `exp` and
/// `nbf` are checked by `jsonwebtoken` before these are trusted.
#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    scp: Option<ScopeClaim>,
    #[serde(default)]
    scopes: Option<Vec<String>>,
    #[serde(default)]
    client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    Spaced(String),
    List(Vec<String>),
}

impl AccessTokenClaims {
    /// Union of `scope`, `scp` and `scopes`, sorted and deduplicated.
    fn take_scopes(&mut self) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        if let Some(s) = self.scope.take() {
            scopes.extend(s.split_whitespace().map(str::to_string));
        }
        match self.scp.take() {
            Some(ScopeClaim::Spaced(s)) => scopes.extend(s.split_whitespace().map(str::to_string)),
            Some(ScopeClaim::List(list)) => scopes.extend(list),
            None => {}
        }
        if let Some(list) = self.scopes.take() {
            scopes.extend(list);
        }
        scopes.sort();
        scopes.dedup();
        scopes
    }
}

/// Validates `Authorization: Bearer <jwt>` against a key set.
pub struct OAuth2Strategy<K> {
    config: OAuth2Config,
    keys: K,
    validation: Validation,
}

impl<K: KeySetSource> OAuth2Strategy<K> {
    pub fn new(config: OAuth2Config, keys: K) -> Result<Self, OAuth2Error> {
        let Some(&first) = config.algorithms.first() else {
            return Err(OAuth2Error::Configuration("at least one algorithm is required".into()));
        };
        if config.issuer.is_empty() || config.audience.is_empty() {
            return Err(OAuth2Error::Configuration("issuer and audience are required".into()));
        }

        let mut validation = Validation::new(first);
        validation.algorithms = config.algorithms.clone();
        validation.leeway = config.leeway.as_secs();
        validation.validate_nbf = true;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        Ok(Self {
            config,
            keys,
            validation,
        })
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    fn validate_token(&self, token: &str) -> AuthenticationResult<OAuth2Context> {
        let header = decode_header(token).map_err(|e| classify(&e))?;

        let keys = self.keys.key_set();
        let Some(key) = keys.get(header.kid.as_deref()) else {
            self.keys.request_refresh();
            return Err(AuthenticationError::Invalid(format!(
                "no key for kid {:?}",
                header.kid
            )));
        };

        let mut claims = decode::<AccessTokenClaims>(token, key, &self.validation)
            .map_err(|e| classify(&e))?
            .claims;
        let scopes = claims.take_scopes();

        Ok(OAuth2Context {
            subject: claims.sub,
            scopes,
            expires_at: claims.exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
            issuer: claims.iss,
            client_id: claims.client_id,
        })
    }
}

impl<K: KeySetSource> AuthenticationStrategy for OAuth2Strategy<K> {
    type Context = OAuth2Context;

    fn method(&self) -> AuthMethod {
        AuthMethod::OAuth2
    }

    fn authenticate<C>(&self, credentials: &C) -> impl Future<Output = AuthenticationResult<OAuth2Context>> + Send
    where
        C: CredentialSource + ?Sized,
    {
        let result = match credentials.bearer_token() {
            Some(token) => self.validate_token(token),
            None if credentials.has_authorization() => Err(AuthenticationError::Malformed(
                "authorization is not a bearer token".into(),
            )),
            None => Err(AuthenticationError::Missing),
        };
        if let Ok(ctx) = &result {
            debug!(subject = %ctx.subject, scopes = ctx.scopes.len(), "Bearer token accepted");
        }
        std::future::ready(result)
    }

    fn challenge(&self) -> Option<String> {
        Some(match &self.config.resource_metadata_url {
            Some(url) => format!("Bearer resource_metadata=\"{url}\""),
            None => "Bearer".to_string(),
        })
    }
}

impl<K> std::fmt::Debug for OAuth2Strategy<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Strategy")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}

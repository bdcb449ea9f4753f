use thiserror::Error;

use crate::error::AuthenticationError;

/// Failures in the OAuth2 machinery itself (configuration, key fetching).
#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("oauth2 configuration error: {0}")]
    Configuration(String),

    #[error("failed to fetch key set: {0}")]
    KeyFetch(#[from] reqwest::Error),

    #[error("key set contains an unusable key: {0}")]
    InvalidKey(#[from] jsonwebtoken::errors::Error),
}

/// Classify a token decoding failure.
pub(crate) fn classify(err: &jsonwebtoken::errors::Error) -> AuthenticationError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => AuthenticationError::Expired,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthenticationError::Malformed(err.to_string()),
        _ => AuthenticationError::Invalid(err.to_string()),
    }
}

//! Authentication layer: transport credentials in, typed context out.

pub mod api_key;
pub mod context;
pub mod credentials;
pub mod strategy;

pub use api_key::{ApiKeyConfig, ApiKeyStrategy, ApiKeyValidator, InMemoryApiKeyValidator};
pub use context::{
    ApiKeyContext, AuthMethod, AuthenticationContext, OAuth2Context, ScopedContext, Unauthenticated,
};
pub use credentials::{CredentialSource, Credentials, parse_bearer};
pub use strategy::{AuthenticationStrategy, NoAuthentication};

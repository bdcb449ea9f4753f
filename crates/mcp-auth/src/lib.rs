//! MCP Auth: access control for MCP transports
//!
//! Two layers, both resolved at compile time:
//! - **Authentication** reads transport credentials (headers, query) and
//!   produces a typed context. It never sees the JSON-RPC payload.
//! - **Authorization** takes that context plus the method extracted from the
//!   decoded payload and returns Allow or Deny.
//!
//! [`AccessControl`] composes a strategy, a policy and a method extractor
//! into the gate the HTTP transport runs for each message.

pub mod authentication;
pub mod authorization;
pub mod error;
pub mod oauth2;

pub use authentication::{
    ApiKeyConfig, ApiKeyContext, ApiKeyStrategy, ApiKeyValidator, AuthMethod,
    AuthenticationContext, AuthenticationStrategy, CredentialSource, Credentials,
    InMemoryApiKeyValidator, NoAuthentication, OAuth2Context, ScopedContext, Unauthenticated,
};
pub use authorization::{
    AccessControl, AuthorizationDecision, AuthorizationPolicy, BinaryAuthorizationPolicy,
    JsonRpcMethodExtractor, MethodExtractor, NoAuthorizationPolicy, OpenAccess, ScopeBasedPolicy,
    ScopeRequirements,
};
pub use error::{
    AuthenticationError, AuthenticationResult, AuthorizationError, MethodExtractionError,
};
pub use oauth2::{
    JwksCache, KeySet, KeySetSource, OAuth2Config, OAuth2Error, OAuth2Strategy,
    ProtectedResourceMetadata, StaticKeySet,
};

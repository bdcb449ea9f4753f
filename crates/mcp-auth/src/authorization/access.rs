//! Authentication and authorization composed into one gate.

use std::future::Future;

use mcp_protocol::JsonRpcMessage;

use super::extractor::{JsonRpcMethodExtractor, MethodExtractor};
use super::policy::{AuthorizationDecision, AuthorizationPolicy, NoAuthorizationPolicy};
use crate::authentication::{AuthenticationStrategy, CredentialSource, NoAuthentication};
use crate::error::AuthenticationResult;

/// The access-control pipeline a transport runs for every inbound message:
/// `authenticate` on transport credentials before decoding, `authorize`
/// on the decoded message.
///
/// All three parts are type parameters. `AccessControl::open()` compiles
/// down to two constant results.
#[derive(Debug, Clone)]
pub struct AccessControl<S, P, E = JsonRpcMethodExtractor> {
    strategy: S,
    policy: P,
    extractor: E,
}

/// No authentication, no authorization.
pub type OpenAccess = AccessControl<NoAuthentication, NoAuthorizationPolicy>;

impl OpenAccess {
    pub fn open() -> Self {
        Self::new(NoAuthentication, NoAuthorizationPolicy)
    }
}

impl<S, P> AccessControl<S, P> {
    pub fn new(strategy: S, policy: P) -> Self {
        Self {
            strategy,
            policy,
            extractor: JsonRpcMethodExtractor,
        }
    }
}

impl<S, P, E> AccessControl<S, P, E> {
    pub fn with_extractor<E2>(self, extractor: E2) -> AccessControl<S, P, E2> {
        AccessControl {
            strategy: self.strategy,
            policy: self.policy,
            extractor,
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }
}

impl<S, P, E> AccessControl<S, P, E>
where
    S: AuthenticationStrategy,
    P: AuthorizationPolicy<S::Context>,
    E: MethodExtractor,
{
    pub fn authenticate<'a, C>(
        &'a self,
        credentials: &'a C,
    ) -> impl Future<Output = AuthenticationResult<S::Context>> + Send + 'a
    where
        C: CredentialSource + ?Sized,
    {
        self.strategy.authenticate(credentials)
    }

    /// Authorize `message` for `context`.
    ///
    /// Responses carry no method; they answer requests this side issued and
    /// are allowed once the sender is authenticated.
    pub fn authorize(&self, context: &S::Context, message: &JsonRpcMessage) -> AuthorizationDecision {
        match self.extractor.extract_method(message) {
            Ok(method) => self.policy.authorize(context, method),
            Err(_) => AuthorizationDecision::Allow,
        }
    }

    pub fn challenge(&self) -> Option<String> {
        self.strategy.challenge()
    }
}

impl Default for OpenAccess {
    fn default() -> Self {
        Self::open()
    }
}

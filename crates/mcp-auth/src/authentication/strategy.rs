//! The strategy seam and the no-op strategy.

use std::future::Future;

use super::context::{AuthMethod, AuthenticationContext, Unauthenticated};
use super::credentials::CredentialSource;
use crate::error::AuthenticationResult;

/// Turns transport credentials into a typed context.
///
/// Strategies are plain generic parameters of the transports that use them,
/// so each configuration compiles to its own path with no dynamic dispatch.
pub trait AuthenticationStrategy: Send + Sync + 'static {
    type Context: AuthenticationContext;

    fn method(&self) -> AuthMethod;

    fn authenticate<C>(
        &self,
        credentials: &C,
    ) -> impl Future<Output = AuthenticationResult<Self::Context>> + Send
    where
        C: CredentialSource + ?Sized;

    /// Value for the `WWW-Authenticate` header on a 401, if any.
    fn challenge(&self) -> Option<String> {
        None
    }
}

/// Accepts every request as [`Unauthenticated`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthentication;

impl AuthenticationStrategy for NoAuthentication {
    type Context = Unauthenticated;

    fn method(&self) -> AuthMethod {
        AuthMethod::None
    }

    #[inline(always)]
    fn authenticate<C>(
        &self,
        _credentials: &C,
    ) -> impl Future<Output = AuthenticationResult<Unauthenticated>> + Send
    where
        C: CredentialSource + ?Sized,
    {
        std::future::ready(Ok(Unauthenticated))
    }
}

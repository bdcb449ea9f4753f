//! Authorization policies.
//!
//! A policy is generic over the context type it understands. Policies that
//! need scopes are only implemented for [`ScopedContext`]s, so wiring one to
//! a strategy whose context has no scopes fails to compile.

use std::sync::Arc;

use tracing::debug;

use super::scope::{Requirement, ScopeRequirements, scope_covers};
use crate::authentication::{AuthenticationContext, ScopedContext};
use crate::error::AuthorizationError;

/// Outcome of one authorization check. Computed per request, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Allow,
    Deny { reason: AuthorizationError },
}

impl AuthorizationDecision {
    #[inline(always)]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn into_result(self) -> Result<(), AuthorizationError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny { reason } => Err(reason),
        }
    }

    fn deny(reason: AuthorizationError) -> Self {
        Self::Deny { reason }
    }
}

pub trait AuthorizationPolicy<C: AuthenticationContext>: Send + Sync + 'static {
    fn authorize(&self, context: &C, method: &str) -> AuthorizationDecision;

    fn policy_name(&self) -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// No authorization
// ─────────────────────────────────────────────────────────────────────────────

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthorizationPolicy;

impl<C: AuthenticationContext> AuthorizationPolicy<C> for NoAuthorizationPolicy {
    #[inline(always)]
    fn authorize(&self, _context: &C, _method: &str) -> AuthorizationDecision {
        AuthorizationDecision::Allow
    }

    fn policy_name(&self) -> &'static str {
        "none"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scope based
// ─────────────────────────────────────────────────────────────────────────────

/// Requires one granted scope to cover the method's requirement.
#[derive(Debug, Clone)]
pub struct ScopeBasedPolicy {
    requirements: Arc<ScopeRequirements>,
}

impl ScopeBasedPolicy {
    pub fn new(requirements: ScopeRequirements) -> Self {
        Self {
            requirements: Arc::new(requirements),
        }
    }

    pub fn mcp() -> Self {
        Self::new(ScopeRequirements::mcp_defaults())
    }

    pub fn requirements(&self) -> &ScopeRequirements {
        &self.requirements
    }
}

impl<C: ScopedContext> AuthorizationPolicy<C> for ScopeBasedPolicy {
    fn authorize(&self, context: &C, method: &str) -> AuthorizationDecision {
        if !context.is_authenticated() {
            return AuthorizationDecision::deny(AuthorizationError::Unauthenticated);
        }

        let required = match self.requirements.requirement(method) {
            None => {
                debug!(method, "No scope requirement configured, denying");
                return AuthorizationDecision::deny(AuthorizationError::MethodUnknown {
                    method: method.to_string(),
                });
            }
            Some(Requirement::Public) => return AuthorizationDecision::Allow,
            Some(Requirement::AnyOf(required)) => required,
        };

        let granted = context.scopes();
        let allowed = granted
            .iter()
            .any(|g| required.iter().any(|r| scope_covers(g, r)));

        if allowed {
            AuthorizationDecision::Allow
        } else {
            debug!(
                method,
                principal = context.principal().unwrap_or("-"),
                "Insufficient scope"
            );
            AuthorizationDecision::deny(AuthorizationError::InsufficientScope {
                required: required.join(" "),
            })
        }
    }

    fn policy_name(&self) -> &'static str {
        "scope"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Binary
// ─────────────────────────────────────────────────────────────────────────────

/// Authenticated callers may call anything; nobody else may call anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryAuthorizationPolicy;

impl<C: AuthenticationContext> AuthorizationPolicy<C> for BinaryAuthorizationPolicy {
    #[inline(always)]
    fn authorize(&self, context: &C, _method: &str) -> AuthorizationDecision {
        if context.is_authenticated() {
            AuthorizationDecision::Allow
        } else {
            AuthorizationDecision::deny(AuthorizationError::Unauthenticated)
        }
    }

    fn policy_name(&self) -> &'static str {
        "binary"
    }
}

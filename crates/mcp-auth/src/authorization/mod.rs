//! Authorization layer: decides whether an authenticated caller may invoke
//! the method named in a decoded JSON-RPC message.

pub mod access;
pub mod extractor;
pub mod policy;
pub mod scope;

pub use access::{AccessControl, OpenAccess};
pub use extractor::{JsonRpcMethodExtractor, MethodExtractor};
pub use policy::{
    AuthorizationDecision, AuthorizationPolicy, BinaryAuthorizationPolicy, NoAuthorizationPolicy,
    ScopeBasedPolicy,
};
pub use scope::{Requirement, ScopeRequirements, scope_covers};

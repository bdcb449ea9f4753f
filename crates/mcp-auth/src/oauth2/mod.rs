//! OAuth2 resource-server support: bearer JWT validation against a cached
//! key set, and protected-resource discovery metadata.

pub mod config;
pub mod error;
pub mod jwks;
pub mod metadata;
pub mod strategy;

pub use config::OAuth2Config;
pub use error::OAuth2Error;
pub use jwks::{JwksCache, KeySet, KeySetSource, StaticKeySet};
pub use metadata::{PROTECTED_RESOURCE_PATH, ProtectedResourceMetadata};
pub use strategy::OAuth2Strategy;

//! Authentication adapters.
//!
//! - `jwks` - RS256 access-token verification against a cached JWKS
//! - `workos` - WorkOS User Management client
//! - `sealed` - AES-GCM sealing for cookie payloads
//! - `mock` - Test implementations that don't require external services

mod jwks;
mod mock;
mod sealed;
mod workos;

pub use jwks::{JwksConfig, JwksTokenVerifier, KeyCache};
pub use mock::{MockIdentityProvider, MockTokenVerifier};
pub use sealed::{CodecError, SealedCookieCodec};
pub use workos::{WorkosClient, WorkosConfig, PROVIDER_NAME};

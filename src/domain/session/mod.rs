//! Session module - token claims, the per-request lifecycle and auth errors.

mod claims;
mod credentials;
mod error;
mod phase;

pub use claims::{TokenClaims, TokenError};
pub use credentials::{Credentials, ProviderSession, RequestMeta, SessionBundle};
pub use error::AuthError;
pub use phase::SessionPhase;

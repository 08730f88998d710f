//! HTTP adapters - the axum surface of the auth service.
//!
//! - `auth` - `/auth/*` routes and `/health`
//! - `middleware` - the per-request session gate and its extractors
//! - `cookies` - session and OAuth state cookies
//! - `envelope` - JSON envelope and the HTTP mapping of `AuthError`

pub mod auth;
pub mod cookies;
pub mod envelope;
pub mod middleware;
pub mod request_meta;
mod router;

pub use cookies::{OAuthState, SessionCookies};
pub use envelope::{ApiError, ErrorBody, MessageResponse};
pub use middleware::{AuthContext, OptionalAuth, RequireAuth};
pub use request_meta::ClientMeta;
pub use router::{build_router, AppDependencies};

//! Identity provider port.
//!
//! The external identity platform is a black box reachable over HTTPS. This
//! port covers every call the auth service makes to it: credential grants,
//! session revocation, user management, email verification and password
//! reset. Every call that the remote uses for risk scoring carries a
//! [`RequestMeta`].
//!
//! Implementations are explicit client objects built once at startup and
//! shared behind an `Arc`; there is no process-wide provider state.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::identity::RemoteUser;
use crate::domain::session::{ProviderSession, RequestMeta};

/// Errors reported by the remote identity provider, classified by the
/// HTTP status it answered with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// 400, 401 or 422 on a credential or code exchange.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// 403 explaining the email address must be verified first.
    #[error("Email verification required")]
    EmailVerificationRequired,

    #[error("Rate limited by identity provider")]
    RateLimited,

    #[error("Resource not found at identity provider")]
    NotFound,

    #[error("Conflicting resource at identity provider")]
    Conflict,

    /// Any other non-success status. `detail` is for logs only.
    #[error("Identity provider rejected request with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// Transport failure or timeout.
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    /// The response body could not be decoded.
    #[error("Invalid response from identity provider: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// The HTTP status the remote answered with, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::InvalidCredentials => Some(401),
            ProviderError::EmailVerificationRequired => Some(403),
            ProviderError::RateLimited => Some(429),
            ProviderError::NotFound => Some(404),
            ProviderError::Conflict => Some(409),
            ProviderError::Rejected { status, .. } => Some(*status),
            ProviderError::Unavailable(_) | ProviderError::InvalidResponse(_) => None,
        }
    }
}

/// Parameters for building a hosted authorization URL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorizationRequest {
    /// Named provider such as `GoogleOAuth`, used when no connection id is set.
    pub provider: Option<String>,
    pub connection_id: Option<String>,
    pub redirect_uri: String,
    pub state: String,
}

/// A user account to create at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRemoteUser {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Remote identity platform operations.
///
/// # Contract
///
/// - Grant calls return the new token pair and the remote profile
/// - `revoke_session` on an already-gone session returns `InvalidCredentials`
///   (the remote answers 401); callers decide whether that matters
/// - `authorization_url` performs no I/O
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short constant tag stored on linked identities.
    fn name(&self) -> &'static str;

    async fn authenticate_with_password(
        &self,
        email: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> Result<ProviderSession, ProviderError>;

    async fn authenticate_with_code(
        &self,
        code: &str,
        meta: &RequestMeta,
    ) -> Result<ProviderSession, ProviderError>;

    async fn authenticate_with_refresh_token(
        &self,
        refresh_token: &str,
        meta: &RequestMeta,
    ) -> Result<ProviderSession, ProviderError>;

    async fn revoke_session(&self, session_id: &str) -> Result<(), ProviderError>;

    async fn create_user(&self, user: &NewRemoteUser) -> Result<RemoteUser, ProviderError>;

    async fn send_verification_email(&self, user_id: &str) -> Result<RemoteUser, ProviderError>;

    async fn verify_email(&self, user_id: &str, code: &str) -> Result<RemoteUser, ProviderError>;

    async fn get_user(&self, user_id: &str) -> Result<RemoteUser, ProviderError>;

    async fn list_users_by_email(
        &self,
        email: &str,
        limit: u32,
    ) -> Result<Vec<RemoteUser>, ProviderError>;

    async fn update_user_email(&self, user_id: &str, email: &str)
        -> Result<RemoteUser, ProviderError>;

    async fn send_password_reset(&self, email: &str, reset_url: &str)
        -> Result<(), ProviderError>;

    async fn reset_password(&self, token: &str, new_password: &str)
        -> Result<RemoteUser, ProviderError>;

    /// Hosted authorization URL for an OAuth sign-in.
    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String, ProviderError>;
}

//! Auth error taxonomy shared by the application and HTTP layers.

use thiserror::Error;

use crate::domain::foundation::{ErrorCode, ValidationError};
use crate::ports::{ProviderError, StoreError};

use super::TokenError;

/// Every failure an auth operation can surface.
///
/// `status()` decides the HTTP status and `public_message()` the text a
/// client sees; the `Display` output is for logs and may carry detail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Invalid token: {0}")]
    InvalidToken(TokenError),

    /// The stored session can no longer be refreshed; the user must log in.
    #[error("Session is no longer valid")]
    SessionDead,

    #[error("Email verification required")]
    EmailVerificationRequired,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Identity provider error")]
    Upstream(#[source] ProviderError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AuthError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AuthError::Internal(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::Validation { .. } => ErrorCode::ValidationFailed,
            AuthError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AuthError::Unauthenticated => ErrorCode::Unauthenticated,
            AuthError::InvalidToken(_) => ErrorCode::InvalidToken,
            AuthError::SessionDead => ErrorCode::SessionExpired,
            AuthError::EmailVerificationRequired => ErrorCode::EmailVerificationRequired,
            AuthError::Forbidden => ErrorCode::Forbidden,
            AuthError::NotFound => ErrorCode::NotFound,
            AuthError::Conflict(_) => ErrorCode::Conflict,
            AuthError::RateLimited => ErrorCode::RateLimited,
            AuthError::Upstream(_) => ErrorCode::UpstreamError,
            AuthError::Store(_) => ErrorCode::DatabaseError,
            AuthError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            AuthError::Validation { .. } => 400,
            AuthError::InvalidCredentials
            | AuthError::Unauthenticated
            | AuthError::InvalidToken(_)
            | AuthError::SessionDead => 401,
            AuthError::EmailVerificationRequired | AuthError::Forbidden => 403,
            AuthError::NotFound => 404,
            AuthError::Conflict(_) => 409,
            AuthError::RateLimited => 429,
            AuthError::Upstream(_) => 502,
            AuthError::Store(_) | AuthError::Internal(_) => 500,
        }
    }

    /// Client-safe message. Never includes upstream bodies, SQL or ids.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Validation { message, .. } => message.clone(),
            AuthError::InvalidCredentials => "Invalid credentials".to_string(),
            AuthError::Unauthenticated => "Authentication required".to_string(),
            AuthError::InvalidToken(_) => "Invalid or expired session".to_string(),
            AuthError::SessionDead => "Session expired, please sign in again".to_string(),
            AuthError::EmailVerificationRequired => "Email verification required".to_string(),
            AuthError::Forbidden => "Forbidden".to_string(),
            AuthError::NotFound => "Not found".to_string(),
            AuthError::Conflict(message) => message.clone(),
            AuthError::RateLimited => "Too many requests, try again later".to_string(),
            AuthError::Upstream(_) => "Identity provider request failed".to_string(),
            AuthError::Store(_) | AuthError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// True for every 401; the client must drop its session cookies.
    pub fn requires_reauthentication(&self) -> bool {
        self.status() == 401
    }

    /// Infrastructure failures, logged at error level.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::Store(_)
                | AuthError::Internal(_)
                | AuthError::Upstream(ProviderError::Unavailable(_))
                | AuthError::InvalidToken(TokenError::KeysUnavailable)
        )
    }
}

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        AuthError::Validation {
            field: err.field().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        AuthError::InvalidToken(err)
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::NotFound,
            other => AuthError::Store(other),
        }
    }
}

/// Provider outcomes with a domain meaning are lifted out of `Upstream`.
impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidCredentials => AuthError::InvalidCredentials,
            ProviderError::EmailVerificationRequired => AuthError::EmailVerificationRequired,
            ProviderError::RateLimited => AuthError::RateLimited,
            ProviderError::NotFound => AuthError::NotFound,
            other => AuthError::Upstream(other),
        }
    }
}

//! Values exchanged while establishing or refreshing a session.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;
use crate::domain::identity::{IdentityTokens, RemoteUser};

/// Client metadata forwarded to the identity provider for risk scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address: ip_address.filter(|ip| !ip.trim().is_empty()),
            user_agent: user_agent.filter(|ua| !ua.trim().is_empty()),
        }
    }
}

/// What a caller presents to obtain a session.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password { email: String, password: String },
    AuthorizationCode(String),
    RefreshToken(String),
}

impl Credentials {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::Password { .. } => "password",
            Credentials::AuthorizationCode(_) => "authorization_code",
            Credentials::RefreshToken(_) => "refresh_token",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::AuthorizationCode(_) => f.write_str("AuthorizationCode(<redacted>)"),
            Credentials::RefreshToken(_) => f.write_str("RefreshToken(<redacted>)"),
        }
    }
}

/// Result of a successful grant at the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: RemoteUser,
}

impl ProviderSession {
    pub fn tokens(&self) -> IdentityTokens {
        IdentityTokens::new(self.access_token.clone(), self.refresh_token.clone())
    }
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("user", &self.user.id)
            .finish()
    }
}

/// The refresh token and session id carried in the sealed session cookie.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBundle {
    pub refresh_token: String,
    pub session_id: String,
}

impl SessionBundle {
    /// Both parts must be non-blank.
    pub fn new(
        refresh_token: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let bundle = Self {
            refresh_token: refresh_token.into(),
            session_id: session_id.into(),
        };
        bundle.validate()?;
        Ok(bundle)
    }

    /// Re-checks a bundle that came back from the client.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.refresh_token.trim().is_empty() {
            return Err(ValidationError::empty_field("refresh_token"));
        }
        if self.session_id.trim().is_empty() {
            return Err(ValidationError::empty_field("session_id"));
        }
        Ok(())
    }
}

impl fmt::Debug for SessionBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBundle")
            .field("refresh_token", &"<redacted>")
            .field("session_id", &self.session_id)
            .finish()
    }
}

//! Link between a local user and one external authentication method.

use crate::domain::foundation::{IdentityId, Timestamp, UserId};

/// Access/refresh token pair returned by the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl IdentityTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl std::fmt::Debug for IdentityTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// A stored identity link. `(provider, subject)` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub id: IdentityId,
    pub user_id: UserId,
    pub provider: String,
    pub subject: String,
    pub provider_email: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AuthIdentity {
    /// The stored refresh token, if present and non-blank.
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Overwrites both tokens.
    pub fn set_tokens(&mut self, tokens: &IdentityTokens) {
        self.access_token = Some(tokens.access_token.clone());
        self.refresh_token = Some(tokens.refresh_token.clone());
    }
}

/// Field values for an identity link that has not been inserted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIdentity {
    pub user_id: UserId,
    pub provider: String,
    pub subject: String,
    pub provider_email: Option<String>,
    pub tokens: Option<IdentityTokens>,
}

impl NewIdentity {
    pub fn into_identity(self, id: IdentityId, now: Timestamp) -> AuthIdentity {
        let (access_token, refresh_token) = match self.tokens {
            Some(tokens) => (Some(tokens.access_token), Some(tokens.refresh_token)),
            None => (None, None),
        };
        AuthIdentity {
            id,
            user_id: self.user_id,
            provider: self.provider,
            subject: self.subject,
            provider_email: self.provider_email,
            access_token,
            refresh_token,
            created_at: now,
            updated_at: now,
        }
    }
}

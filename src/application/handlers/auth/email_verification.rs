//! Email verification handlers, delegated to the identity provider.

use std::sync::Arc;

use tracing::info;

use crate::application::{DefaultTeamProvisioner, IdentityReconciler};
use crate::domain::foundation::{validate_email, validate_external_id};
use crate::domain::identity::User;
use crate::domain::session::AuthError;
use crate::domain::team::Team;
use crate::ports::IdentityProvider;

// ════════════════════════════════════════════════════════════════════════════
// Send
// ════════════════════════════════════════════════════════════════════════════

/// Sends a verification email to an authenticated user.
pub struct SendVerificationHandler {
    provider: Arc<dyn IdentityProvider>,
}

impl SendVerificationHandler {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    pub async fn handle(&self, user: &User) -> Result<(), AuthError> {
        let external_id = user
            .external_id
            .as_deref()
            .ok_or_else(|| AuthError::validation("user", "User is not linked to the identity provider"))?;
        self.provider.send_verification_email(external_id).await?;
        info!(user_id = %user.id, "Verification email sent");
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Resend
// ════════════════════════════════════════════════════════════════════════════

/// Result of a resend; the confirmation id is the remote user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResendVerificationResult {
    pub confirmation_id: String,
}

/// Re-sends the verification email for an address, without a session.
pub struct ResendVerificationHandler {
    provider: Arc<dyn IdentityProvider>,
}

impl ResendVerificationHandler {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    pub async fn handle(&self, email: &str) -> Result<ResendVerificationResult, AuthError> {
        let email = validate_email(email)?;
        let remote = self
            .provider
            .list_users_by_email(&email, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(AuthError::NotFound)?;

        self.provider.send_verification_email(&remote.id).await?;
        Ok(ResendVerificationResult {
            confirmation_id: remote.id,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Confirm
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct ConfirmVerificationCommand {
    pub code: String,
    pub confirmation_id: Option<String>,
    pub user_id: Option<String>,
}

impl ConfirmVerificationCommand {
    /// `confirmation_id` wins over `user_id`; blanks count as absent.
    fn target(&self) -> Result<String, AuthError> {
        let (field, id) = [
            ("confirmation_id", self.confirmation_id.as_deref()),
            ("user_id", self.user_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, id)| id.map(|id| (field, id.trim())))
        .find(|(_, id)| !id.is_empty())
        .ok_or_else(|| AuthError::validation("confirmation_id", "User id is required"))?;
        Ok(validate_external_id(field, id)?)
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmVerificationResult {
    pub user: User,
    pub default_team: Option<Team>,
}

pub struct ConfirmVerificationHandler {
    provider: Arc<dyn IdentityProvider>,
    reconciler: Arc<IdentityReconciler>,
    teams: Arc<DefaultTeamProvisioner>,
}

impl ConfirmVerificationHandler {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        reconciler: Arc<IdentityReconciler>,
        teams: Arc<DefaultTeamProvisioner>,
    ) -> Self {
        Self {
            provider,
            reconciler,
            teams,
        }
    }

    pub async fn handle(
        &self,
        cmd: ConfirmVerificationCommand,
    ) -> Result<ConfirmVerificationResult, AuthError> {
        let code = cmd.code.trim();
        if code.is_empty() {
            return Err(AuthError::validation("code", "Verification code is required"));
        }
        let target = cmd.target()?;

        let remote = self.provider.verify_email(&target, code).await?;
        let outcome = self.reconciler.ensure_local_user(&remote, None).await?;
        let default_team = self.teams.ensure_default_team(&outcome.user).await;

        info!(user_id = %outcome.user.id, "Email verified");
        Ok(ConfirmVerificationResult {
            user: outcome.user,
            default_team,
        })
    }
}

//! ChangeEmailHandler - replaces an authenticated user's email.
//!
//! The local store is checked for another owner of the address, then the
//! provider is updated, then the local row is reconciled from the provider's
//! answer: the email is replaced, verification is cleared and the identity
//! link is kept with its email snapshot updated.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::application::IdentityReconciler;
use crate::domain::foundation::validate_email;
use crate::domain::identity::User;
use crate::domain::session::AuthError;
use crate::ports::{IdentityProvider, IdentityStore, ProviderError};

#[derive(Debug, Clone)]
pub struct ChangeEmailCommand {
    pub user: User,
    pub email: String,
}

pub struct ChangeEmailHandler {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn IdentityStore>,
    reconciler: Arc<IdentityReconciler>,
}

fn email_taken() -> AuthError {
    AuthError::Conflict("Email is already used by another account".to_string())
}

impl ChangeEmailHandler {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn IdentityStore>,
        reconciler: Arc<IdentityReconciler>,
    ) -> Self {
        Self {
            provider,
            store,
            reconciler,
        }
    }

    pub async fn handle(&self, cmd: ChangeEmailCommand) -> Result<User, AuthError> {
        let email = validate_email(&cmd.email)?;
        if cmd.user.email.as_deref() == Some(email.as_str()) {
            return Ok(cmd.user);
        }
        let external_id = cmd
            .user
            .external_id
            .as_deref()
            .ok_or_else(|| AuthError::validation("user", "User is not linked to the identity provider"))?;

        if let Some(owner) = self.store.find_user_by_email(&email).await? {
            if owner.id != cmd.user.id {
                return Err(email_taken());
            }
        }

        let remote = self
            .provider
            .update_user_email(external_id, &email)
            .await
            .map_err(|e| match e {
                ProviderError::Conflict => email_taken(),
                other => AuthError::from(other),
            })?;

        let user = match self.reconciler.ensure_local_user(&remote, None).await {
            Ok(outcome) => outcome.user,
            Err(e) => {
                error!(
                    user_id = %cmd.user.id,
                    external_id,
                    error = %e,
                    "Provider email changed but local user was not updated"
                );
                return Err(e);
            }
        };

        if let Err(e) = self.provider.send_verification_email(&remote.id).await {
            warn!(user_id = %user.id, error = %e, "Failed to send verification email");
        }

        info!(user_id = %user.id, "Email changed");
        Ok(user)
    }
}

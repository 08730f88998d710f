//! SignUpHandler - registers a user at the identity provider.
//!
//! No session is issued: the user has to verify their email and then log in.

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::IdentityReconciler;
use crate::domain::foundation::{validate_email, validate_optional_name, validate_password};
use crate::domain::identity::User;
use crate::domain::session::AuthError;
use crate::ports::{IdentityProvider, NewRemoteUser, ProviderError};

#[derive(Clone)]
pub struct SignUpCommand {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl std::fmt::Debug for SignUpCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUpCommand")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SignUpResult {
    pub user: User,
    /// Remote user id the client echoes back when confirming the email.
    pub confirmation_id: String,
}

pub struct SignUpHandler {
    provider: Arc<dyn IdentityProvider>,
    reconciler: Arc<IdentityReconciler>,
}

impl SignUpHandler {
    pub fn new(provider: Arc<dyn IdentityProvider>, reconciler: Arc<IdentityReconciler>) -> Self {
        Self {
            provider,
            reconciler,
        }
    }

    pub async fn handle(&self, cmd: SignUpCommand) -> Result<SignUpResult, AuthError> {
        let email = validate_email(&cmd.email)?;
        validate_password(&cmd.password)?;
        let first_name = validate_optional_name("first_name", cmd.first_name.as_deref())?;
        let last_name = validate_optional_name("last_name", cmd.last_name.as_deref())?;

        let remote = self
            .provider
            .create_user(&NewRemoteUser {
                email,
                password: cmd.password,
                first_name,
                last_name,
            })
            .await
            .map_err(|e| match e {
                ProviderError::Conflict => {
                    AuthError::Conflict("An account with this email already exists".to_string())
                }
                other => AuthError::from(other),
            })?;

        let outcome = self.reconciler.ensure_local_user(&remote, None).await?;

        if let Err(e) = self.provider.send_verification_email(&remote.id).await {
            warn!(external_id = %remote.id, error = %e, "Failed to send verification email");
        }

        info!(user_id = %outcome.user.id, "User registered");
        Ok(SignUpResult {
            user: outcome.user,
            confirmation_id: remote.id,
        })
    }
}

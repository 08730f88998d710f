//! Password reset handlers.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::foundation::{validate_email, validate_password};
use crate::domain::session::AuthError;
use crate::ports::{IdentityProvider, ProviderError};

/// Asks the provider to email a reset link pointing at `reset_url`.
pub struct RequestPasswordResetHandler {
    provider: Arc<dyn IdentityProvider>,
    reset_url: String,
}

impl RequestPasswordResetHandler {
    pub fn new(provider: Arc<dyn IdentityProvider>, reset_url: impl Into<String>) -> Self {
        Self {
            provider,
            reset_url: reset_url.into(),
        }
    }

    /// An unknown address is reported as success so the endpoint cannot be
    /// used to probe for accounts.
    pub async fn handle(&self, email: &str) -> Result<(), AuthError> {
        let email = validate_email(email)?;
        match self.provider.send_password_reset(&email, &self.reset_url).await {
            Ok(()) => Ok(()),
            Err(ProviderError::NotFound) => {
                debug!("Password reset requested for unknown email");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone)]
pub struct ConfirmPasswordResetCommand {
    pub token: String,
    pub password: String,
}

impl std::fmt::Debug for ConfirmPasswordResetCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConfirmPasswordResetCommand { .. }")
    }
}

pub struct ConfirmPasswordResetHandler {
    provider: Arc<dyn IdentityProvider>,
}

impl ConfirmPasswordResetHandler {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// # Errors
    ///
    /// - `Validation` for a blank token, a weak password, or a token the
    ///   provider does not accept
    pub async fn handle(&self, cmd: ConfirmPasswordResetCommand) -> Result<(), AuthError> {
        let token = cmd.token.trim();
        if token.is_empty() {
            return Err(AuthError::validation("token", "Reset token is required"));
        }
        validate_password(&cmd.password)?;

        let remote = self
            .provider
            .reset_password(token, &cmd.password)
            .await
            .map_err(|e| match e {
                ProviderError::InvalidCredentials | ProviderError::NotFound => {
                    AuthError::validation("token", "Reset token is invalid or expired")
                }
                other => AuthError::from(other),
            })?;

        info!(external_id = %remote.id, "Password reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockIdentityProvider;
    use crate::domain::session::RequestMeta;

    fn provider() -> Arc<MockIdentityProvider> {
        Arc::new(MockIdentityProvider::new().with_user(
            MockIdentityProvider::remote_user("user_a", "a@example.com", true),
            Some("Str0ng!Pass"),
        ))
    }

    #[tokio::test]
    async fn reset_flow_changes_password() {
        let provider = provider();
        RequestPasswordResetHandler::new(provider.clone(), "http://app.test/auth/password/confirm")
            .handle("a@example.com")
            .await
            .unwrap();
        assert!(provider.calls()[0].ends_with("http://app.test/auth/password/confirm"));
        let token = provider.reset_token_for("user_a").unwrap();

        ConfirmPasswordResetHandler::new(provider.clone())
            .handle(ConfirmPasswordResetCommand {
                token,
                password: "N3w!Password".to_string(),
            })
            .await
            .unwrap();

        assert!(provider
            .authenticate_with_password("a@example.com", "N3w!Password", &RequestMeta::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_email_is_silent() {
        let provider = Arc::new(MockIdentityProvider::new().with_failure(
            "send_password_reset",
            ProviderError::NotFound,
        ));
        assert!(RequestPasswordResetHandler::new(provider, "http://app.test/reset")
            .handle("ghost@example.com")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn bad_token_is_a_validation_error() {
        let err = ConfirmPasswordResetHandler::new(provider())
            .handle(ConfirmPasswordResetCommand {
                token: "reset_404".to_string(),
                password: "N3w!Password".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn weak_password_is_rejected_before_provider() {
        let provider = provider();
        let err = ConfirmPasswordResetHandler::new(provider.clone())
            .handle(ConfirmPasswordResetCommand {
                token: "reset_1".to_string(),
                password: "weak".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(provider.calls().is_empty());
    }
}

//! RefreshSessionHandler - explicit refresh from the sealed session bundle.

use std::sync::Arc;

use tracing::debug;

use crate::application::{IdentityReconciler, SessionManager};
use crate::domain::session::{AuthError, RequestMeta, SessionBundle};

use super::SignedIn;

#[derive(Debug, Clone)]
pub struct RefreshSessionCommand {
    pub bundle: SessionBundle,
    pub meta: RequestMeta,
}

pub struct RefreshSessionHandler {
    sessions: Arc<SessionManager>,
    reconciler: Arc<IdentityReconciler>,
}

impl RefreshSessionHandler {
    pub fn new(sessions: Arc<SessionManager>, reconciler: Arc<IdentityReconciler>) -> Self {
        Self {
            sessions,
            reconciler,
        }
    }

    /// # Errors
    ///
    /// - `SessionDead` when the provider rejects the refresh token
    /// - `InvalidToken` when the new access token fails verification
    pub async fn handle(&self, cmd: RefreshSessionCommand) -> Result<SignedIn, AuthError> {
        cmd.bundle.validate()?;

        let session = self
            .sessions
            .authenticate_with_refresh_token(&cmd.bundle.refresh_token, &cmd.meta)
            .await?;

        let user = self
            .reconciler
            .ensure_local_user_by_external_id(&session.claims.subject, Some(&session.tokens()))
            .await?;

        debug!(user_id = %user.id, session_id = %cmd.bundle.session_id, "Session refreshed");
        Ok(SignedIn {
            session,
            user,
            default_team: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::{MockIdentityProvider, MockTokenVerifier};
    use crate::adapters::memory::InMemoryIdentityStore;
    use crate::application::CredentialVerifier;
    use crate::ports::IdentityStore;

    fn setup() -> (RefreshSessionHandler, Arc<MockIdentityProvider>, InMemoryIdentityStore) {
        let tokens = Arc::new(MockTokenVerifier::new());
        let provider = Arc::new(
            MockIdentityProvider::new()
                .with_verifier(tokens.clone())
                .with_user(
                    MockIdentityProvider::remote_user("user_a", "a@example.com", true),
                    None,
                ),
        );
        let store = InMemoryIdentityStore::new();
        let handler = RefreshSessionHandler::new(
            Arc::new(SessionManager::new(
                provider.clone(),
                tokens,
                CredentialVerifier::DelegatedProvider,
            )),
            Arc::new(IdentityReconciler::new(Arc::new(store.clone()), provider.clone())),
        );
        (handler, provider, store)
    }

    #[tokio::test]
    async fn refresh_rotates_tokens_and_reconciles_unknown_user() {
        let (handler, provider, store) = setup();
        let refresh_token = provider.issue_refresh_token("user_a", "session_9");

        let signed_in = handler
            .handle(RefreshSessionCommand {
                bundle: SessionBundle::new(refresh_token.clone(), "session_9").unwrap(),
                meta: RequestMeta::default(),
            })
            .await
            .unwrap();

        assert_ne!(signed_in.session.refresh_token, refresh_token);
        assert_eq!(signed_in.session.claims.session_id.as_deref(), Some("session_9"));
        assert_eq!(signed_in.user.external_id.as_deref(), Some("user_a"));

        let link = store.find_identity("workos", "user_a").await.unwrap().unwrap();
        assert_eq!(link.refresh_token, Some(signed_in.session.refresh_token));
    }

    #[tokio::test]
    async fn spent_refresh_token_is_dead() {
        let (handler, provider, _) = setup();
        let refresh_token = provider.issue_refresh_token("user_a", "session_9");
        let cmd = RefreshSessionCommand {
            bundle: SessionBundle::new(refresh_token, "session_9").unwrap(),
            meta: RequestMeta::default(),
        };

        assert!(handler.handle(cmd.clone()).await.is_ok());
        assert_eq!(handler.handle(cmd).await.unwrap_err(), AuthError::SessionDead);
    }
}

//! SessionManager - obtains, verifies and revokes provider sessions.
//!
//! Every grant goes through the configured [`CredentialVerifier`], then the
//! returned access token is verified before the session is handed back.
//! Cookie transport is the HTTP adapter's concern; this layer deals in
//! tokens, claims and [`SessionBundle`]s.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CredentialStrategy;
use crate::domain::identity::{IdentityTokens, RemoteUser};
use crate::domain::session::{
    AuthError, Credentials, ProviderSession, RequestMeta, SessionBundle, TokenClaims, TokenError,
};
use crate::ports::{IdentityProvider, ProviderError, TokenVerifier};

// ════════════════════════════════════════════════════════════════════════════
// Credential verifier
// ════════════════════════════════════════════════════════════════════════════

/// The single place that decides which credentials a deployment accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialVerifier {
    /// Email and password, plus refresh.
    Password,
    /// Social login via authorization code, plus refresh.
    OAuthSocial,
    /// Everything the identity provider offers.
    DelegatedProvider,
}

impl CredentialVerifier {
    pub fn from_strategy(strategy: CredentialStrategy) -> Self {
        match strategy {
            CredentialStrategy::Password => CredentialVerifier::Password,
            CredentialStrategy::OauthSocial => CredentialVerifier::OAuthSocial,
            CredentialStrategy::DelegatedProvider => CredentialVerifier::DelegatedProvider,
        }
    }

    pub fn accepts(&self, credentials: &Credentials) -> bool {
        match (self, credentials) {
            (_, Credentials::RefreshToken(_)) => true,
            (CredentialVerifier::DelegatedProvider, _) => true,
            (CredentialVerifier::Password, Credentials::Password { .. }) => true,
            (CredentialVerifier::OAuthSocial, Credentials::AuthorizationCode(_)) => true,
            _ => false,
        }
    }

    /// # Errors
    ///
    /// - `Forbidden` when the credential kind is disabled
    pub fn check(&self, credentials: &Credentials) -> Result<(), AuthError> {
        if self.accepts(credentials) {
            Ok(())
        } else {
            debug!(kind = credentials.kind(), verifier = ?self, "Credential kind disabled");
            Err(AuthError::Forbidden)
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Established session
// ════════════════════════════════════════════════════════════════════════════

/// A provider session whose access token has been verified.
#[derive(Clone)]
pub struct EstablishedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub claims: TokenClaims,
    pub user: RemoteUser,
}

impl EstablishedSession {
    pub fn tokens(&self) -> IdentityTokens {
        IdentityTokens::new(self.access_token.clone(), self.refresh_token.clone())
    }

    /// The `{refresh_token, session_id}` pair for the session cookie.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` when the access token carries no session id
    pub fn bundle(&self) -> Result<SessionBundle, AuthError> {
        let session_id = self
            .claims
            .session_id
            .as_deref()
            .ok_or(AuthError::InvalidToken(TokenError::MissingClaim("sid")))?;
        Ok(SessionBundle::new(self.refresh_token.clone(), session_id)?)
    }
}

impl fmt::Debug for EstablishedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EstablishedSession")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("subject", &self.claims.subject)
            .field("session_id", &self.claims.session_id)
            .finish()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Session manager
// ════════════════════════════════════════════════════════════════════════════

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    verifier: Arc<dyn TokenVerifier>,
    credentials: CredentialVerifier,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        verifier: Arc<dyn TokenVerifier>,
        credentials: CredentialVerifier,
    ) -> Self {
        Self {
            provider,
            verifier,
            credentials,
        }
    }

    pub fn credential_verifier(&self) -> CredentialVerifier {
        self.credentials
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Exchange credentials for a verified session.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the credential kind is disabled
    /// - `InvalidCredentials`, `EmailVerificationRequired`, `RateLimited`
    ///   mapped from the provider's response
    /// - `SessionDead` if a refresh token is rejected; the caller must not
    ///   retry and the user has to log in again
    /// - `InvalidToken` if the issued access token fails verification
    /// - `Upstream` for any other provider failure
    pub async fn authenticate(
        &self,
        credentials: Credentials,
        meta: &RequestMeta,
    ) -> Result<EstablishedSession, AuthError> {
        self.credentials.check(&credentials)?;

        let session = match &credentials {
            Credentials::Password { email, password } => self
                .provider
                .authenticate_with_password(email, password, meta)
                .await
                .map_err(AuthError::from)?,
            Credentials::AuthorizationCode(code) => self
                .provider
                .authenticate_with_code(code, meta)
                .await
                .map_err(AuthError::from)?,
            Credentials::RefreshToken(refresh_token) => self
                .provider
                .authenticate_with_refresh_token(refresh_token, meta)
                .await
                .map_err(refresh_error)?,
        };

        self.establish(session).await
    }

    pub async fn authenticate_with_password(
        &self,
        email: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> Result<EstablishedSession, AuthError> {
        self.authenticate(
            Credentials::Password {
                email: email.to_string(),
                password: password.to_string(),
            },
            meta,
        )
        .await
    }

    pub async fn authenticate_with_code(
        &self,
        code: &str,
        meta: &RequestMeta,
    ) -> Result<EstablishedSession, AuthError> {
        self.authenticate(Credentials::AuthorizationCode(code.to_string()), meta)
            .await
    }

    pub async fn authenticate_with_refresh_token(
        &self,
        refresh_token: &str,
        meta: &RequestMeta,
    ) -> Result<EstablishedSession, AuthError> {
        self.authenticate(Credentials::RefreshToken(refresh_token.to_string()), meta)
            .await
    }

    /// Verify an access token presented by a client.
    ///
    /// An expired but otherwise valid token yields `TokenError::Expired`
    /// carrying its claims.
    pub async fn verify_access_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verifier.verify(token).await
    }

    /// Revoke a provider session.
    ///
    /// A session the provider no longer knows is already revoked, so a 401
    /// or 404 from the provider counts as success.
    pub async fn revoke_session(&self, session_id: &str) -> Result<(), AuthError> {
        match self.provider.revoke_session(session_id).await {
            Ok(()) => Ok(()),
            Err(ProviderError::InvalidCredentials | ProviderError::NotFound) => {
                debug!(session_id, "Session already gone at provider");
                Ok(())
            }
            Err(e) => {
                warn!(session_id, error = %e, "Failed to revoke session");
                Err(AuthError::Upstream(e))
            }
        }
    }

    async fn establish(&self, session: ProviderSession) -> Result<EstablishedSession, AuthError> {
        let claims = self
            .verifier
            .verify(&session.access_token)
            .await
            .map_err(AuthError::InvalidToken)?;

        if claims.subject != session.user.id {
            warn!(
                subject = %claims.subject,
                user = %session.user.id,
                "Access token subject does not match provider user"
            );
            return Err(AuthError::InvalidToken(TokenError::InvalidClaim("sub")));
        }

        Ok(EstablishedSession {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            claims,
            user: session.user,
        })
    }
}

/// A rejected refresh token means the session is over.
fn refresh_error(error: ProviderError) -> AuthError {
    match error {
        ProviderError::InvalidCredentials | ProviderError::NotFound => AuthError::SessionDead,
        other => AuthError::from(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::{MockIdentityProvider, MockTokenVerifier};

    fn meta() -> RequestMeta {
        RequestMeta::new(Some("203.0.113.7".to_string()), Some("tests".to_string()))
    }

    fn setup(verifier: CredentialVerifier) -> (SessionManager, Arc<MockIdentityProvider>) {
        let tokens = Arc::new(MockTokenVerifier::new());
        let provider = Arc::new(
            MockIdentityProvider::new()
                .with_verifier(tokens.clone())
                .with_user(
                    MockIdentityProvider::remote_user("user_a", "a@example.com", true),
                    Some("Str0ng!Pass"),
                )
                .with_oauth_code(
                    "code-b",
                    MockIdentityProvider::remote_user("user_b", "b@example.com", true),
                ),
        );
        let manager = SessionManager::new(provider.clone(), tokens, verifier);
        (manager, provider)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Credential verifier
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn verifier_variants_gate_credential_kinds() {
        let password = Credentials::Password {
            email: "a@example.com".to_string(),
            password: "x".to_string(),
        };
        let code = Credentials::AuthorizationCode("c".to_string());
        let refresh = Credentials::RefreshToken("r".to_string());

        assert!(CredentialVerifier::Password.accepts(&password));
        assert!(!CredentialVerifier::Password.accepts(&code));
        assert!(CredentialVerifier::Password.accepts(&refresh));

        assert!(!CredentialVerifier::OAuthSocial.accepts(&password));
        assert!(CredentialVerifier::OAuthSocial.accepts(&code));
        assert!(CredentialVerifier::OAuthSocial.accepts(&refresh));

        for credentials in [&password, &code, &refresh] {
            assert!(CredentialVerifier::DelegatedProvider.accepts(credentials));
        }
        assert_eq!(
            CredentialVerifier::OAuthSocial.check(&password),
            Err(AuthError::Forbidden)
        );
    }

    #[test]
    fn verifier_is_built_from_strategy() {
        assert_eq!(
            CredentialVerifier::from_strategy(CredentialStrategy::OauthSocial),
            CredentialVerifier::OAuthSocial
        );
        assert_eq!(
            CredentialVerifier::from_strategy(CredentialStrategy::default()),
            CredentialVerifier::DelegatedProvider
        );
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Grants
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn password_login_yields_verified_session() {
        let (manager, _) = setup(CredentialVerifier::DelegatedProvider);
        let session = manager
            .authenticate_with_password("a@example.com", "Str0ng!Pass", &meta())
            .await
            .unwrap();

        assert_eq!(session.claims.subject, "user_a");
        let bundle = session.bundle().unwrap();
        assert_eq!(bundle.refresh_token, session.refresh_token);
        assert_eq!(Some(bundle.session_id), session.claims.session_id);
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let (manager, _) = setup(CredentialVerifier::DelegatedProvider);
        assert_eq!(
            manager
                .authenticate_with_password("a@example.com", "nope", &meta())
                .await
                .unwrap_err(),
            AuthError::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn disabled_credential_kind_never_reaches_provider() {
        let (manager, provider) = setup(CredentialVerifier::Password);
        assert_eq!(
            manager.authenticate_with_code("code-b", &meta()).await.unwrap_err(),
            AuthError::Forbidden
        );
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_refresh_token_kills_the_session() {
        let (manager, _) = setup(CredentialVerifier::DelegatedProvider);
        assert_eq!(
            manager
                .authenticate_with_refresh_token("rt_unknown", &meta())
                .await
                .unwrap_err(),
            AuthError::SessionDead
        );
    }

    #[tokio::test]
    async fn provider_outage_on_refresh_is_upstream_not_dead() {
        let (manager, provider) = setup(CredentialVerifier::DelegatedProvider);
        provider.fail(
            "authenticate_with_refresh_token",
            ProviderError::Unavailable("timeout".to_string()),
        );
        let err = manager
            .authenticate_with_refresh_token("rt", &meta())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 502);
    }

    #[tokio::test]
    async fn unverifiable_access_token_is_rejected() {
        // Provider without a linked verifier issues tokens nobody can verify.
        let provider = Arc::new(MockIdentityProvider::new().with_oauth_code(
            "code-b",
            MockIdentityProvider::remote_user("user_b", "b@example.com", true),
        ));
        let manager = SessionManager::new(
            provider,
            Arc::new(MockTokenVerifier::new()),
            CredentialVerifier::DelegatedProvider,
        );
        assert!(matches!(
            manager.authenticate_with_code("code-b", &meta()).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Revocation
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn revoking_unknown_session_is_not_an_error() {
        let (manager, _) = setup(CredentialVerifier::DelegatedProvider);
        assert!(manager.revoke_session("session_gone").await.is_ok());
    }

    #[tokio::test]
    async fn revoke_outage_is_reported() {
        let (manager, provider) = setup(CredentialVerifier::DelegatedProvider);
        provider.fail("revoke_session", ProviderError::Unavailable("down".to_string()));
        assert!(matches!(
            manager.revoke_session("session_1").await,
            Err(AuthError::Upstream(_))
        ));
    }
}

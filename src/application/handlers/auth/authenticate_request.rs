//! AuthenticateRequestHandler - the per-request session gate.
//!
//! Verifies the presented access token, resolves the linked identity and
//! local user, and silently refreshes an expired token using the refresh
//! token stored on the identity. Every failure is reported as a 401-class
//! error; infrastructure failures fail closed.

use std::sync::Arc;

use tracing::{debug, error};

use crate::application::{EstablishedSession, SessionManager};
use crate::domain::foundation::StateMachine;
use crate::domain::identity::{AuthIdentity, User};
use crate::domain::session::{AuthError, RequestMeta, SessionPhase, TokenClaims, TokenError};
use crate::ports::{IdentityStore, StoreError};

/// A request whose session reached `Active`.
#[derive(Debug, Clone)]
pub struct AuthenticatedRequest {
    pub user: User,
    pub identity: AuthIdentity,
    pub claims: TokenClaims,
    pub phase: SessionPhase,
    /// The replacement session when the presented token had expired.
    pub refreshed: Option<EstablishedSession>,
}

pub struct AuthenticateRequestHandler {
    sessions: Arc<SessionManager>,
    store: Arc<dyn IdentityStore>,
}

impl AuthenticateRequestHandler {
    pub fn new(sessions: Arc<SessionManager>, store: Arc<dyn IdentityStore>) -> Self {
        Self { sessions, store }
    }

    pub async fn handle(
        &self,
        access_token: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<AuthenticatedRequest, AuthError> {
        let token = access_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::Unauthenticated)?;
        let mut phase = advance(SessionPhase::Anonymous, SessionPhase::Authenticating)?;

        let (claims, expired) = match self.sessions.verify_access_token(token).await {
            Ok(claims) => (claims, false),
            Err(TokenError::Expired(claims)) => (*claims, true),
            Err(e) => {
                debug!(error = %e, "Rejected access token");
                return Err(AuthError::InvalidToken(e));
            }
        };

        let provider = self.sessions.provider().name();
        let identity = self
            .store
            .find_identity(provider, &claims.subject)
            .await
            .map_err(fail_closed)?
            .ok_or_else(|| {
                debug!(subject = %claims.subject, "No identity linked to token subject");
                AuthError::Unauthenticated
            })?;

        let (claims, identity, refreshed) = if expired {
            phase = advance(phase, SessionPhase::Expired)?;
            phase = advance(phase, SessionPhase::Refreshing)?;
            let (identity, session) = self.refresh(identity, meta).await?;
            (session.claims.clone(), identity, Some(session))
        } else {
            (claims, identity, None)
        };

        let user = self
            .store
            .find_user(identity.user_id)
            .await
            .map_err(fail_closed)?
            .filter(|user| !user.is_deleted())
            .ok_or_else(|| {
                debug!(user_id = %identity.user_id, "Identity points at no live user");
                AuthError::Unauthenticated
            })?;

        phase = advance(phase, SessionPhase::Active)?;
        Ok(AuthenticatedRequest {
            user,
            identity,
            claims,
            phase,
            refreshed,
        })
    }

    /// Mint a new token pair from the identity's stored refresh token and
    /// persist it on the link.
    async fn refresh(
        &self,
        mut identity: AuthIdentity,
        meta: &RequestMeta,
    ) -> Result<(AuthIdentity, EstablishedSession), AuthError> {
        let refresh_token = identity.usable_refresh_token().ok_or_else(|| {
            debug!(identity_id = %identity.id, "Expired token and no stored refresh token");
            AuthError::SessionDead
        })?;

        let session = match self
            .sessions
            .authenticate_with_refresh_token(refresh_token, meta)
            .await
        {
            Ok(session) => session,
            Err(e) if e.is_transient() => {
                error!(error = %e, "Session refresh failed");
                return Err(AuthError::SessionDead);
            }
            Err(e) => {
                debug!(error = %e, "Session refresh rejected");
                return Err(AuthError::SessionDead);
            }
        };
        if session.claims.subject != identity.subject {
            error!(identity_id = %identity.id, "Refreshed token belongs to another subject");
            return Err(AuthError::SessionDead);
        }

        let tokens = session.tokens();
        self.store
            .update_identity_tokens(identity.id, &tokens)
            .await
            .map_err(fail_closed)?;
        identity.set_tokens(&tokens);

        debug!(identity_id = %identity.id, "Refreshed expired access token");
        Ok((identity, session))
    }
}

fn advance(from: SessionPhase, to: SessionPhase) -> Result<SessionPhase, AuthError> {
    from.transition_to(to)
        .map_err(|e| AuthError::internal(e.to_string()))
}

fn fail_closed(e: StoreError) -> AuthError {
    error!(error = %e, "Store failure while authenticating request");
    AuthError::Unauthenticated
}

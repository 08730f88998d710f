//! SignInHandler - password login and OAuth code exchange.

use std::sync::Arc;

use tracing::info;

use crate::application::{DefaultTeamProvisioner, EstablishedSession, IdentityReconciler, SessionManager};
use crate::domain::foundation::validate_email;
use crate::domain::identity::User;
use crate::domain::session::{AuthError, Credentials, RequestMeta};
use crate::domain::team::Team;

/// Command to sign a user in with credentials.
#[derive(Debug, Clone)]
pub struct SignInCommand {
    pub credentials: Credentials,
    pub meta: RequestMeta,
}

impl SignInCommand {
    pub fn password(email: &str, password: &str, meta: RequestMeta) -> Self {
        Self {
            credentials: Credentials::Password {
                email: email.to_string(),
                password: password.to_string(),
            },
            meta,
        }
    }

    pub fn authorization_code(code: &str, meta: RequestMeta) -> Self {
        Self {
            credentials: Credentials::AuthorizationCode(code.to_string()),
            meta,
        }
    }
}

/// A verified session together with the reconciled local user.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub session: EstablishedSession,
    pub user: User,
    /// Set when this sign-in provisioned the user's default team.
    pub default_team: Option<Team>,
}

pub struct SignInHandler {
    sessions: Arc<SessionManager>,
    reconciler: Arc<IdentityReconciler>,
    teams: Arc<DefaultTeamProvisioner>,
}

impl SignInHandler {
    pub fn new(
        sessions: Arc<SessionManager>,
        reconciler: Arc<IdentityReconciler>,
        teams: Arc<DefaultTeamProvisioner>,
    ) -> Self {
        Self {
            sessions,
            reconciler,
            teams,
        }
    }

    pub async fn handle(&self, cmd: SignInCommand) -> Result<SignedIn, AuthError> {
        // 1. Normalize input before it reaches the provider
        let credentials = match cmd.credentials {
            Credentials::Password { email, password } => {
                let email = validate_email(&email)?;
                if password.trim().is_empty() {
                    return Err(AuthError::validation("password", "Password is required"));
                }
                Credentials::Password { email, password }
            }
            Credentials::AuthorizationCode(code) => {
                let code = code.trim();
                if code.is_empty() {
                    return Err(AuthError::validation("code", "Authorization code is required"));
                }
                Credentials::AuthorizationCode(code.to_string())
            }
            // Refresh goes through RefreshSessionHandler.
            Credentials::RefreshToken(_) => return Err(AuthError::Forbidden),
        };
        let kind = credentials.kind();

        // 2. Grant and verify the issued token
        let session = self.sessions.authenticate(credentials, &cmd.meta).await?;

        // 3. Reconcile the local user and store the new tokens on the link
        let outcome = self
            .reconciler
            .ensure_local_user(&session.user, Some(&session.tokens()))
            .await?;

        // 4. Default team, best effort
        let default_team = self.teams.ensure_default_team(&outcome.user).await;

        info!(user_id = %outcome.user.id, kind, "User signed in");
        Ok(SignedIn {
            session,
            user: outcome.user,
            default_team,
        })
    }
}

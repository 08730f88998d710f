//! SignOutHandler - best-effort session revocation.

use std::sync::Arc;

use tracing::info;

use crate::application::SessionManager;
use crate::domain::session::SessionBundle;

pub struct SignOutHandler {
    sessions: Arc<SessionManager>,
}

impl SignOutHandler {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// Revoke the session named by the bundle, if any.
    ///
    /// Never fails: signing out always succeeds locally. Returns whether the
    /// provider confirmed the revocation.
    pub async fn handle(&self, bundle: Option<SessionBundle>) -> bool {
        let Some(bundle) = bundle else {
            return false;
        };
        let revoked = self.sessions.revoke_session(&bundle.session_id).await.is_ok();
        info!(session_id = %bundle.session_id, revoked, "User signed out");
        revoked
    }
}

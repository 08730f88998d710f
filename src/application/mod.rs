//! Application layer - services and command handlers.
//!
//! Services hold the reusable auth logic (session grants, identity
//! reconciliation, default-team provisioning); handlers orchestrate them
//! per operation.

mod default_team;
pub mod handlers;
mod identity_reconciler;
mod session_manager;

pub use default_team::DefaultTeamProvisioner;
pub use identity_reconciler::{IdentityReconciler, ReconcileOutcome};
pub use session_manager::{CredentialVerifier, EstablishedSession, SessionManager};

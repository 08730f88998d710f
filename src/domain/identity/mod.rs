//! Identity module - local users, linked identities and remote profiles.

mod auth_identity;
mod preferences;
mod remote;
mod user;

pub use auth_identity::{AuthIdentity, IdentityTokens, NewIdentity};
pub use preferences::{UserPreferences, DEFAULT_LANGUAGE, DEFAULT_THEME};
pub use remote::{ReconciledProfile, RemoteUser};
pub use user::{NewUser, User};

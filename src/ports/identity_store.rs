//! Identity store port.
//!
//! Persistence boundary for local users, linked identities, preferences and
//! the team rows written by default-team provisioning.
//!
//! # Design
//!
//! - **Transactions are explicit**: multi-step writes go through
//!   [`IdentityTransaction`], which rolls back when dropped uncommitted
//! - **Unique indexes are the source of truth**: a conflicting insert
//!   reports [`StoreError::UniqueViolation`] naming the violated key, and the
//!   transaction stays usable afterwards so the caller can re-read and update
//! - **Soft deletes**: every lookup ignores soft-deleted users
//!
//! # Example
//!
//! ```ignore
//! let mut tx = store.begin().await?;
//! let user = match tx.insert_user(&new_user).await {
//!     Ok(user) => user,
//!     Err(StoreError::UniqueViolation(UniqueKey::UserEmail)) => {
//!         tx.find_user_by_email(email).await?.ok_or(StoreError::NotFound)?
//!     }
//!     Err(e) => return Err(e),
//! };
//! tx.commit().await?;
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{IdentityId, TeamId, UserId};
use crate::domain::identity::{
    AuthIdentity, IdentityTokens, NewIdentity, NewUser, User, UserPreferences,
};
use crate::domain::team::{NewTeam, Team, TeamMembership, TeamRole};

/// Which unique index a conflicting write hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    UserEmail,
    UserExternalId,
    IdentityProviderSubject,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0:?}")]
    UniqueViolation(UniqueKey),

    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn database(message: impl Into<String>) -> Self {
        StoreError::Database(message.into())
    }

    /// The violated key, if this is a unique violation.
    pub fn unique_key(&self) -> Option<UniqueKey> {
        match self {
            StoreError::UniqueViolation(key) => Some(*key),
            _ => None,
        }
    }
}

/// Read access and single-statement writes outside a transaction.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Open a transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn IdentityTransaction>, StoreError>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_external_id(&self, external_id: &str)
        -> Result<Option<User>, StoreError>;

    /// Case-insensitive lookup on the normalized address.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<AuthIdentity>, StoreError>;

    /// Replace the stored token pair on an identity link.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the link no longer exists
    async fn update_identity_tokens(
        &self,
        id: IdentityId,
        tokens: &IdentityTokens,
    ) -> Result<(), StoreError>;

    /// Remove a user's link to a provider. Returns whether a row was removed.
    async fn unlink_identity(&self, user_id: UserId, provider: &str) -> Result<bool, StoreError>;

    async fn list_teams_for_user(&self, user_id: UserId)
        -> Result<Vec<TeamMembership>, StoreError>;

    async fn find_preferences(&self, user_id: UserId)
        -> Result<Option<UserPreferences>, StoreError>;

    /// Mark a user deleted, freeing its email and external id.
    ///
    /// # Errors
    ///
    /// - `NotFound` if there is no live user with this id
    async fn soft_delete_user(&self, id: UserId) -> Result<(), StoreError>;
}

/// A unit of work against the identity tables.
#[async_trait]
pub trait IdentityTransaction: Send {
    async fn find_user_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;

    /// # Errors
    ///
    /// - `UniqueViolation(UserEmail | UserExternalId)` on a live duplicate
    async fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError>;

    /// Persist every mutable field and return the stored row.
    async fn update_user(&mut self, user: &User) -> Result<User, StoreError>;

    async fn insert_preferences(&mut self, preferences: &UserPreferences)
        -> Result<(), StoreError>;

    async fn find_identity(
        &mut self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<AuthIdentity>, StoreError>;

    /// # Errors
    ///
    /// - `UniqueViolation(IdentityProviderSubject)` if the pair is taken
    async fn insert_identity(&mut self, identity: &NewIdentity)
        -> Result<AuthIdentity, StoreError>;

    async fn update_identity(&mut self, identity: &AuthIdentity)
        -> Result<AuthIdentity, StoreError>;

    /// Lock the user's row for the rest of the transaction and list its
    /// memberships. A second transaction locking the same user waits until
    /// this one ends.
    ///
    /// # Errors
    ///
    /// - `NotFound` if there is no live user with this id
    async fn lock_user_teams(&mut self, user_id: UserId)
        -> Result<Vec<TeamMembership>, StoreError>;

    async fn insert_team(&mut self, team: &NewTeam) -> Result<Team, StoreError>;

    async fn add_member(
        &mut self,
        team_id: TeamId,
        user_id: UserId,
        role: TeamRole,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_key_is_exposed_only_for_violations() {
        assert_eq!(
            StoreError::UniqueViolation(UniqueKey::UserEmail).unique_key(),
            Some(UniqueKey::UserEmail)
        );
        assert_eq!(StoreError::NotFound.unique_key(), None);
        assert_eq!(StoreError::database("boom").unique_key(), None);
    }

    #[test]
    fn store_traits_are_object_safe_and_send() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        fn assert_send<T: Send + ?Sized>() {}
        assert_send_sync::<dyn IdentityStore>();
        assert_send::<dyn IdentityTransaction>();
    }
}

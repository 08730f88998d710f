//! Default-team provisioning run after a successful login or verification.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::identity::User;
use crate::domain::team::{NewTeam, Team, TeamRole};
use crate::ports::{IdentityStore, StoreError};

/// Gives every verified user a team of their own.
pub struct DefaultTeamProvisioner {
    store: Arc<dyn IdentityStore>,
}

impl DefaultTeamProvisioner {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Create "<name>'s team" (or "My team") owned by `user` when the user
    /// is verified and belongs to no team.
    ///
    /// Best effort: failures are logged and reported as `None`, never
    /// surfaced, since a missing team must not block login.
    pub async fn ensure_default_team(&self, user: &User) -> Option<Team> {
        if !user.is_email_verified() {
            return None;
        }
        match self.provision(user).await {
            Ok(team) => team,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Failed to provision default team");
                None
            }
        }
    }

    async fn provision(&self, user: &User) -> Result<Option<Team>, StoreError> {
        let mut tx = self.store.begin().await?;
        if !tx.lock_user_teams(user.id).await?.is_empty() {
            return Ok(None);
        }

        let team = tx
            .insert_team(&NewTeam::default_for(user.id, user.display_name()))
            .await?;
        tx.add_member(team.id, user.id, TeamRole::Owner).await?;
        tx.commit().await?;

        info!(user_id = %user.id, team_id = %team.id, "Provisioned default team");
        Ok(Some(team))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryIdentityStore;
    use crate::domain::foundation::Timestamp;
    use crate::domain::identity::NewUser;

    async fn user(store: &InMemoryIdentityStore, name: Option<&str>, verified: bool) -> User {
        let mut tx = store.begin().await.unwrap();
        let user = tx
            .insert_user(&NewUser {
                email: Some("a@example.com".to_string()),
                name: name.map(str::to_string),
                avatar_url: None,
                external_id: Some("user_1".to_string()),
                email_verified_at: verified.then(Timestamp::now),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        user
    }

    #[tokio::test]
    async fn verified_user_without_team_gets_one() {
        let store = InMemoryIdentityStore::new();
        let user = user(&store, Some("Ada"), true).await;
        let provisioner = DefaultTeamProvisioner::new(Arc::new(store.clone()));

        let team = provisioner.ensure_default_team(&user).await.unwrap();
        assert_eq!(team.name, "Ada's team");
        assert_eq!(team.owner_id, user.id);

        let teams = store.list_teams_for_user(user.id).await.unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].role, TeamRole::Owner);
    }

    #[tokio::test]
    async fn nameless_user_gets_my_team() {
        let store = InMemoryIdentityStore::new();
        let user = user(&store, None, true).await;
        let team = DefaultTeamProvisioner::new(Arc::new(store))
            .ensure_default_team(&user)
            .await
            .unwrap();
        assert_eq!(team.name, "My team");
    }

    #[tokio::test]
    async fn second_call_is_a_noop() {
        let store = InMemoryIdentityStore::new();
        let user = user(&store, Some("Ada"), true).await;
        let provisioner = DefaultTeamProvisioner::new(Arc::new(store.clone()));

        assert!(provisioner.ensure_default_team(&user).await.is_some());
        assert!(provisioner.ensure_default_team(&user).await.is_none());
        assert_eq!(store.team_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_logins_provision_exactly_one_team() {
        let store = InMemoryIdentityStore::new();
        let user = user(&store, Some("Ada"), true).await;
        let provisioner = Arc::new(DefaultTeamProvisioner::new(Arc::new(store.clone())));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let provisioner = provisioner.clone();
            let user = user.clone();
            tasks.spawn(async move { provisioner.ensure_default_team(&user).await });
        }
        let mut created = 0;
        while let Some(team) = tasks.join_next().await {
            created += usize::from(team.unwrap().is_some());
        }

        assert_eq!(created, 1);
        assert_eq!(store.team_count(), 1);
        assert_eq!(store.list_teams_for_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unverified_user_gets_nothing() {
        let store = InMemoryIdentityStore::new();
        let user = user(&store, Some("Ada"), false).await;
        assert!(DefaultTeamProvisioner::new(Arc::new(store.clone()))
            .ensure_default_team(&user)
            .await
            .is_none());
        assert_eq!(store.team_count(), 0);
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let store = InMemoryIdentityStore::new();
        let user = user(&store, Some("Ada"), true).await;
        store.set_failure(Some(StoreError::database("connection reset")));

        assert!(DefaultTeamProvisioner::new(Arc::new(store))
            .ensure_default_team(&user)
            .await
            .is_none());
    }
}

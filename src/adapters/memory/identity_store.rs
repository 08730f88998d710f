//! In-Memory Identity Store Adapter
//!
//! Keeps users, identity links, preferences and teams in memory. Useful for
//! tests and local development.
//!
//! Transaction writes are applied to the shared state immediately and undone
//! if the transaction is dropped without committing. Concurrent transactions
//! therefore see each other's uncommitted rows, and a second insert of the
//! same email or external id fails with `UniqueViolation` exactly as a
//! database unique index would. User row locks are held until the
//! transaction commits or is dropped.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

use crate::domain::foundation::{IdentityId, TeamId, Timestamp, UserId};
use crate::domain::identity::{
    AuthIdentity, IdentityTokens, NewIdentity, NewUser, User, UserPreferences,
};
use crate::domain::team::{NewTeam, Team, TeamMembership, TeamRole};
use crate::ports::{IdentityStore, IdentityTransaction, StoreError, UniqueKey};

#[derive(Debug, Default)]
struct StoreState {
    users: BTreeMap<UserId, User>,
    identities: BTreeMap<IdentityId, AuthIdentity>,
    preferences: HashMap<UserId, UserPreferences>,
    teams: BTreeMap<TeamId, Team>,
    members: Vec<(TeamId, UserId, TeamRole)>,
    row_locks: HashMap<UserId, Arc<tokio::sync::Mutex<()>>>,
    last_id: i64,
    failure: Option<StoreError>,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn live_users(&self) -> impl Iterator<Item = &User> {
        self.users.values().filter(|user| !user.is_deleted())
    }

    fn user_by_external_id(&self, external_id: &str) -> Option<User> {
        self.live_users()
            .find(|user| user.external_id.as_deref() == Some(external_id))
            .cloned()
    }

    fn user_by_email(&self, email: &str) -> Option<User> {
        let email = email.trim();
        self.live_users()
            .find(|user| {
                user.email
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
            })
            .cloned()
    }

    fn identity(&self, provider: &str, subject: &str) -> Option<AuthIdentity> {
        self.identities
            .values()
            .find(|link| link.provider == provider && link.subject == subject)
            .cloned()
    }

    /// Unique checks for a user row, ignoring the row being updated.
    fn check_user_unique(
        &self,
        email: Option<&str>,
        external_id: Option<&str>,
        exclude: Option<UserId>,
    ) -> Result<(), StoreError> {
        let others = self
            .live_users()
            .filter(|user| Some(user.id) != exclude)
            .collect::<Vec<_>>();

        if let Some(email) = email {
            if others.iter().any(|user| {
                user.email
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
            }) {
                return Err(StoreError::UniqueViolation(UniqueKey::UserEmail));
            }
        }
        if let Some(external_id) = external_id {
            if others
                .iter()
                .any(|user| user.external_id.as_deref() == Some(external_id))
            {
                return Err(StoreError::UniqueViolation(UniqueKey::UserExternalId));
            }
        }
        Ok(())
    }

    fn memberships(&self, user_id: UserId) -> Vec<TeamMembership> {
        self.members
            .iter()
            .filter(|(_, member, _)| *member == user_id)
            .filter_map(|(team_id, _, role)| {
                self.teams.get(team_id).map(|team| TeamMembership {
                    team: team.clone(),
                    role: *role,
                })
            })
            .collect()
    }
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory implementation of [`IdentityStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<StoreError>) {
        lock(&self.state).failure = error;
    }

    /// Number of live users.
    pub fn user_count(&self) -> usize {
        lock(&self.state).live_users().count()
    }

    pub fn identity_count(&self) -> usize {
        lock(&self.state).identities.len()
    }

    pub fn team_count(&self) -> usize {
        lock(&self.state).teams.len()
    }

    /// Every identity link owned by `user_id`.
    pub fn identities_for(&self, user_id: UserId) -> Vec<AuthIdentity> {
        lock(&self.state)
            .identities
            .values()
            .filter(|link| link.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn begin(&self) -> Result<Box<dyn IdentityTransaction>, StoreError> {
        lock(&self.state).check_failure()?;
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            undo: Vec::new(),
            row_locks: Vec::new(),
            committed: false,
        }))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let state = lock(&self.state);
        state.check_failure()?;
        Ok(state.users.get(&id).filter(|u| !u.is_deleted()).cloned())
    }

    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let state = lock(&self.state);
        state.check_failure()?;
        Ok(state.user_by_external_id(external_id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = lock(&self.state);
        state.check_failure()?;
        Ok(state.user_by_email(email))
    }

    async fn find_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<AuthIdentity>, StoreError> {
        let state = lock(&self.state);
        state.check_failure()?;
        Ok(state.identity(provider, subject))
    }

    async fn update_identity_tokens(
        &self,
        id: IdentityId,
        tokens: &IdentityTokens,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.check_failure()?;
        let link = state.identities.get_mut(&id).ok_or(StoreError::NotFound)?;
        link.set_tokens(tokens);
        link.updated_at = Timestamp::now();
        Ok(())
    }

    async fn unlink_identity(&self, user_id: UserId, provider: &str) -> Result<bool, StoreError> {
        let mut state = lock(&self.state);
        state.check_failure()?;
        let before = state.identities.len();
        state
            .identities
            .retain(|_, link| !(link.user_id == user_id && link.provider == provider));
        Ok(state.identities.len() != before)
    }

    async fn list_teams_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<TeamMembership>, StoreError> {
        let state = lock(&self.state);
        state.check_failure()?;
        Ok(state.memberships(user_id))
    }

    async fn find_preferences(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserPreferences>, StoreError> {
        let state = lock(&self.state);
        state.check_failure()?;
        Ok(state.preferences.get(&user_id).cloned())
    }

    async fn soft_delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.check_failure()?;
        let user = state
            .users
            .get_mut(&id)
            .filter(|u| !u.is_deleted())
            .ok_or(StoreError::NotFound)?;
        let now = Timestamp::now();
        user.deleted_at = Some(now);
        user.updated_at = now;
        Ok(())
    }
}

/// A reversible change, recorded so an uncommitted transaction can roll back.
#[derive(Debug)]
enum Undo {
    InsertUser(UserId),
    UpdateUser(Box<User>),
    InsertPreferences(UserId),
    InsertIdentity(IdentityId),
    UpdateIdentity(Box<AuthIdentity>),
    InsertTeam(TeamId),
    AddMember(TeamId, UserId),
}

struct InMemoryTransaction {
    state: Arc<Mutex<StoreState>>,
    undo: Vec<Undo>,
    // Dropped after `Drop::drop` has rolled back, so waiters see the undo.
    row_locks: Vec<(UserId, OwnedMutexGuard<()>)>,
    committed: bool,
}

impl InMemoryTransaction {
    fn state(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        let state = lock(&self.state);
        state.check_failure()?;
        Ok(state)
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.committed || self.undo.is_empty() {
            return;
        }
        let mut state = lock(&self.state);
        for change in self.undo.drain(..).rev() {
            match change {
                Undo::InsertUser(id) => {
                    state.users.remove(&id);
                }
                Undo::UpdateUser(previous) => {
                    state.users.insert(previous.id, *previous);
                }
                Undo::InsertPreferences(user_id) => {
                    state.preferences.remove(&user_id);
                }
                Undo::InsertIdentity(id) => {
                    state.identities.remove(&id);
                }
                Undo::UpdateIdentity(previous) => {
                    state.identities.insert(previous.id, *previous);
                }
                Undo::InsertTeam(id) => {
                    state.teams.remove(&id);
                }
                Undo::AddMember(team_id, user_id) => {
                    state
                        .members
                        .retain(|(team, user, _)| !(*team == team_id && *user == user_id));
                }
            }
        }
    }
}

#[async_trait]
impl IdentityTransaction for InMemoryTransaction {
    async fn find_user_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.state()?.user_by_external_id(external_id))
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state()?.user_by_email(email))
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        let mut state = lock(&self.state);
        state.check_failure()?;
        state.check_user_unique(user.email.as_deref(), user.external_id.as_deref(), None)?;

        let id = UserId::new(state.next_id());
        let row = user.clone().into_user(id, Timestamp::now());
        state.users.insert(id, row.clone());
        drop(state);

        self.undo.push(Undo::InsertUser(id));
        Ok(row)
    }

    async fn update_user(&mut self, user: &User) -> Result<User, StoreError> {
        let mut state = lock(&self.state);
        state.check_failure()?;
        let previous = state
            .users
            .get(&user.id)
            .filter(|u| !u.is_deleted())
            .cloned()
            .ok_or(StoreError::NotFound)?;
        state.check_user_unique(
            user.email.as_deref(),
            user.external_id.as_deref(),
            Some(user.id),
        )?;

        let mut row = user.clone();
        row.created_at = previous.created_at;
        row.updated_at = Timestamp::now();
        state.users.insert(row.id, row.clone());
        drop(state);

        self.undo.push(Undo::UpdateUser(Box::new(previous)));
        Ok(row)
    }

    async fn insert_preferences(
        &mut self,
        preferences: &UserPreferences,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.check_failure()?;
        if state.preferences.contains_key(&preferences.user_id) {
            return Err(StoreError::UniqueViolation(UniqueKey::Other));
        }
        state
            .preferences
            .insert(preferences.user_id, preferences.clone());
        drop(state);

        self.undo.push(Undo::InsertPreferences(preferences.user_id));
        Ok(())
    }

    async fn find_identity(
        &mut self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<AuthIdentity>, StoreError> {
        Ok(self.state()?.identity(provider, subject))
    }

    async fn insert_identity(
        &mut self,
        identity: &NewIdentity,
    ) -> Result<AuthIdentity, StoreError> {
        let mut state = lock(&self.state);
        state.check_failure()?;
        if state.identity(&identity.provider, &identity.subject).is_some() {
            return Err(StoreError::UniqueViolation(
                UniqueKey::IdentityProviderSubject,
            ));
        }

        let id = IdentityId::new(state.next_id());
        let row = identity.clone().into_identity(id, Timestamp::now());
        state.identities.insert(id, row.clone());
        drop(state);

        self.undo.push(Undo::InsertIdentity(id));
        Ok(row)
    }

    async fn update_identity(
        &mut self,
        identity: &AuthIdentity,
    ) -> Result<AuthIdentity, StoreError> {
        let mut state = lock(&self.state);
        state.check_failure()?;
        let previous = state
            .identities
            .get(&identity.id)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let mut row = identity.clone();
        row.created_at = previous.created_at;
        row.updated_at = Timestamp::now();
        state.identities.insert(row.id, row.clone());
        drop(state);

        self.undo.push(Undo::UpdateIdentity(Box::new(previous)));
        Ok(row)
    }

    async fn lock_user_teams(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<TeamMembership>, StoreError> {
        if !self.row_locks.iter().any(|(held, _)| *held == user_id) {
            let row_lock = {
                let mut state = self.state()?;
                if !state.users.get(&user_id).is_some_and(|user| !user.is_deleted()) {
                    return Err(StoreError::NotFound);
                }
                Arc::clone(state.row_locks.entry(user_id).or_default())
            };
            let guard = row_lock.lock_owned().await;
            self.row_locks.push((user_id, guard));
        }
        Ok(self.state()?.memberships(user_id))
    }

    async fn insert_team(&mut self, team: &NewTeam) -> Result<Team, StoreError> {
        let mut state = lock(&self.state);
        state.check_failure()?;
        let id = TeamId::new(state.next_id());
        let row = team.clone().into_team(id, Timestamp::now());
        state.teams.insert(id, row.clone());
        drop(state);

        self.undo.push(Undo::InsertTeam(id));
        Ok(row)
    }

    async fn add_member(
        &mut self,
        team_id: TeamId,
        user_id: UserId,
        role: TeamRole,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.check_failure()?;
        if !state.teams.contains_key(&team_id) {
            return Err(StoreError::NotFound);
        }
        if state
            .members
            .iter()
            .any(|(team, user, _)| *team == team_id && *user == user_id)
        {
            return Err(StoreError::UniqueViolation(UniqueKey::Other));
        }
        state.members.push((team_id, user_id, role));
        drop(state);

        self.undo.push(Undo::AddMember(team_id, user_id));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.state()?;
        self.committed = true;
        Ok(())
    }
}

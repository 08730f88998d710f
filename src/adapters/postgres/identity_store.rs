//! PostgreSQL implementation of IdentityStore.
//!
//! Unique indexes on `users` and `auth_identities` are the source of truth
//! for duplicate detection. Inserts inside a transaction run under a
//! SAVEPOINT so a unique violation leaves the surrounding transaction usable
//! for the caller's re-read and update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};

use crate::domain::foundation::{IdentityId, TeamId, Timestamp, UserId};
use crate::domain::identity::{
    AuthIdentity, IdentityTokens, NewIdentity, NewUser, User, UserPreferences,
};
use crate::domain::team::{NewTeam, Team, TeamMembership, TeamRole};
use crate::ports::{IdentityStore, IdentityTransaction, StoreError, UniqueKey};

const USER_COLUMNS: &str = "id, email, name, avatar_url, external_id, email_verified_at, \
                            created_at, updated_at, deleted_at";

const IDENTITY_COLUMNS: &str = "id, user_id, provider, subject, provider_email, \
                                access_token, refresh_token, created_at, updated_at";

/// PostgreSQL implementation of the IdentityStore port.
#[derive(Clone)]
pub struct PostgresIdentityStore {
    pool: PgPool,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Rows
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
    external_id: Option<String>,
    email_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::new(row.id),
            email: row.email,
            name: row.name,
            avatar_url: row.avatar_url,
            external_id: row.external_id,
            email_verified_at: row.email_verified_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            deleted_at: row.deleted_at.map(Timestamp::from_datetime),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    id: i64,
    user_id: i64,
    provider: String,
    subject: String,
    provider_email: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<IdentityRow> for AuthIdentity {
    fn from(row: IdentityRow) -> Self {
        AuthIdentity {
            id: IdentityId::new(row.id),
            user_id: UserId::new(row.user_id),
            provider: row.provider,
            subject: row.subject,
            provider_email: row.provider_email,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TeamRow {
    id: i64,
    name: String,
    icon: Option<String>,
    owner_id: i64,
    created_at: DateTime<Utc>,
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Team {
            id: TeamId::new(row.id),
            name: row.name,
            icon: row.icon,
            owner_id: UserId::new(row.owner_id),
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    id: i64,
    name: String,
    icon: Option<String>,
    owner_id: i64,
    created_at: DateTime<Utc>,
    role: String,
}

impl TryFrom<MembershipRow> for TeamMembership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<TeamRole>()
            .map_err(|e| StoreError::database(format!("Invalid team role: {}", e)))?;
        Ok(TeamMembership {
            team: Team::from(TeamRow {
                id: row.id,
                name: row.name,
                icon: row.icon,
                owner_id: row.owner_id,
                created_at: row.created_at,
            }),
            role,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PreferencesRow {
    user_id: i64,
    theme: String,
    language: String,
}

impl From<PreferencesRow> for UserPreferences {
    fn from(row: PreferencesRow) -> Self {
        UserPreferences {
            user_id: UserId::new(row.user_id),
            theme: row.theme,
            language: row.language,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Error mapping
// ════════════════════════════════════════════════════════════════════════════

fn unique_key_for(constraint: Option<&str>) -> UniqueKey {
    match constraint {
        Some("users_email_active_key") => UniqueKey::UserEmail,
        Some("users_external_id_active_key") => UniqueKey::UserExternalId,
        Some("auth_identities_provider_subject_key") => UniqueKey::IdentityProviderSubject,
        _ => UniqueKey::Other,
    }
}

fn map_db_error(context: &str, error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::UniqueViolation(unique_key_for(db_err.constraint()))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::database(format!("Failed to {}: {}", context, error)),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Queries shared by the pool and transactions
// ════════════════════════════════════════════════════════════════════════════

async fn select_user_by_external_id<'e, E: PgExecutor<'e>>(
    executor: E,
    external_id: &str,
) -> Result<Option<User>, StoreError> {
    let sql = format!(
        "SELECT {} FROM users WHERE external_id = $1 AND deleted_at IS NULL",
        USER_COLUMNS
    );
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(external_id)
        .fetch_optional(executor)
        .await
        .map(|row| row.map(User::from))
        .map_err(|e| map_db_error("fetch user by external id", e))
}

async fn select_user_by_email<'e, E: PgExecutor<'e>>(
    executor: E,
    email: &str,
) -> Result<Option<User>, StoreError> {
    let sql = format!(
        "SELECT {} FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL",
        USER_COLUMNS
    );
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(email.trim())
        .fetch_optional(executor)
        .await
        .map(|row| row.map(User::from))
        .map_err(|e| map_db_error("fetch user by email", e))
}

async fn select_memberships<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: UserId,
) -> Result<Vec<TeamMembership>, StoreError> {
    let rows = sqlx::query_as::<_, MembershipRow>(
        r#"
        SELECT t.id, t.name, t.icon, t.owner_id, t.created_at, ut.role
        FROM teams t
        JOIN user_teams ut ON ut.team_id = t.id
        WHERE ut.user_id = $1
        ORDER BY t.id
        "#,
    )
    .bind(user_id.as_i64())
    .fetch_all(executor)
    .await
    .map_err(|e| map_db_error("list teams", e))?;

    rows.into_iter().map(TeamMembership::try_from).collect()
}

async fn select_identity<'e, E: PgExecutor<'e>>(
    executor: E,
    provider: &str,
    subject: &str,
) -> Result<Option<AuthIdentity>, StoreError> {
    let sql = format!(
        "SELECT {} FROM auth_identities WHERE provider = $1 AND subject = $2",
        IDENTITY_COLUMNS
    );
    sqlx::query_as::<_, IdentityRow>(&sql)
        .bind(provider)
        .bind(subject)
        .fetch_optional(executor)
        .await
        .map(|row| row.map(AuthIdentity::from))
        .map_err(|e| map_db_error("fetch identity", e))
}

#[async_trait]
impl IdentityStore for PostgresIdentityStore {
    async fn begin(&self) -> Result<Box<dyn IdentityTransaction>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error("begin transaction", e))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(User::from))
            .map_err(|e| map_db_error("fetch user", e))
    }

    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        select_user_by_external_id(&self.pool, external_id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        select_user_by_email(&self.pool, email).await
    }

    async fn find_identity(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<AuthIdentity>, StoreError> {
        select_identity(&self.pool, provider, subject).await
    }

    async fn update_identity_tokens(
        &self,
        id: IdentityId,
        tokens: &IdentityTokens,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE auth_identities SET
                access_token = $2,
                refresh_token = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("update identity tokens", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn unlink_identity(&self, user_id: UserId, provider: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM auth_identities WHERE user_id = $1 AND provider = $2")
            .bind(user_id.as_i64())
            .bind(provider)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("unlink identity", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_teams_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<TeamMembership>, StoreError> {
        select_memberships(&self.pool, user_id).await
    }

    async fn find_preferences(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserPreferences>, StoreError> {
        sqlx::query_as::<_, PreferencesRow>(
            "SELECT user_id, theme, language FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(UserPreferences::from))
        .map_err(|e| map_db_error("fetch preferences", e))
    }

    async fn soft_delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = now(), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("soft delete user", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Transaction
// ════════════════════════════════════════════════════════════════════════════

/// Rolls back on drop unless committed.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn savepoint(&mut self, name: &str) -> Result<(), StoreError> {
        sqlx::query(&format!("SAVEPOINT {}", name))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_db_error("create savepoint", e))?;
        Ok(())
    }

    /// Release the savepoint on success, roll back to it on failure.
    async fn finish_savepoint(&mut self, name: &str, succeeded: bool) -> Result<(), StoreError> {
        let sql = if succeeded {
            format!("RELEASE SAVEPOINT {}", name)
        } else {
            format!("ROLLBACK TO SAVEPOINT {}", name)
        };
        sqlx::query(&sql)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_db_error("finish savepoint", e))?;
        Ok(())
    }
}

#[async_trait]
impl IdentityTransaction for PostgresTransaction {
    async fn find_user_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        select_user_by_external_id(&mut *self.tx, external_id).await
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        select_user_by_email(&mut *self.tx, email).await
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, name, avatar_url, external_id, email_verified_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        self.savepoint("insert_user").await?;
        let result = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.avatar_url)
            .bind(&user.external_id)
            .bind(user.email_verified_at.map(|ts| *ts.as_datetime()))
            .fetch_one(&mut *self.tx)
            .await;
        self.finish_savepoint("insert_user", result.is_ok()).await?;

        result
            .map(User::from)
            .map_err(|e| map_db_error("insert user", e))
    }

    async fn update_user(&mut self, user: &User) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users SET
                email = $2,
                name = $3,
                avatar_url = $4,
                external_id = $5,
                email_verified_at = $6,
                updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        self.savepoint("update_user").await?;
        let result = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id.as_i64())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.avatar_url)
            .bind(&user.external_id)
            .bind(user.email_verified_at.map(|ts| *ts.as_datetime()))
            .fetch_optional(&mut *self.tx)
            .await;
        self.finish_savepoint("update_user", result.is_ok()).await?;

        result
            .map_err(|e| map_db_error("update user", e))?
            .map(User::from)
            .ok_or(StoreError::NotFound)
    }

    async fn insert_preferences(
        &mut self,
        preferences: &UserPreferences,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_preferences (user_id, theme, language) VALUES ($1, $2, $3)",
        )
        .bind(preferences.user_id.as_i64())
        .bind(&preferences.theme)
        .bind(&preferences.language)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_db_error("insert preferences", e))?;
        Ok(())
    }

    async fn find_identity(
        &mut self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<AuthIdentity>, StoreError> {
        select_identity(&mut *self.tx, provider, subject).await
    }

    async fn insert_identity(
        &mut self,
        identity: &NewIdentity,
    ) -> Result<AuthIdentity, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO auth_identities
                (user_id, provider, subject, provider_email, access_token, refresh_token)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            IDENTITY_COLUMNS
        );
        let (access_token, refresh_token) = match &identity.tokens {
            Some(tokens) => (
                Some(tokens.access_token.as_str()),
                Some(tokens.refresh_token.as_str()),
            ),
            None => (None, None),
        };

        self.savepoint("insert_identity").await?;
        let result = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(identity.user_id.as_i64())
            .bind(&identity.provider)
            .bind(&identity.subject)
            .bind(&identity.provider_email)
            .bind(access_token)
            .bind(refresh_token)
            .fetch_one(&mut *self.tx)
            .await;
        self.finish_savepoint("insert_identity", result.is_ok())
            .await?;

        result
            .map(AuthIdentity::from)
            .map_err(|e| map_db_error("insert identity", e))
    }

    async fn update_identity(
        &mut self,
        identity: &AuthIdentity,
    ) -> Result<AuthIdentity, StoreError> {
        let sql = format!(
            r#"
            UPDATE auth_identities SET
                user_id = $2,
                provider_email = $3,
                access_token = $4,
                refresh_token = $5,
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            IDENTITY_COLUMNS
        );
        sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(identity.id.as_i64())
            .bind(identity.user_id.as_i64())
            .bind(&identity.provider_email)
            .bind(&identity.access_token)
            .bind(&identity.refresh_token)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_db_error("update identity", e))?
            .map(AuthIdentity::from)
            .ok_or(StoreError::NotFound)
    }

    async fn lock_user_teams(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<TeamMembership>, StoreError> {
        sqlx::query("SELECT id FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
            .bind(user_id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_db_error("lock user", e))?
            .ok_or(StoreError::NotFound)?;

        select_memberships(&mut *self.tx, user_id).await
    }

    async fn insert_team(&mut self, team: &NewTeam) -> Result<Team, StoreError> {
        sqlx::query_as::<_, TeamRow>(
            r#"
            INSERT INTO teams (name, icon, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, icon, owner_id, created_at
            "#,
        )
        .bind(&team.name)
        .bind(&team.icon)
        .bind(team.owner_id.as_i64())
        .fetch_one(&mut *self.tx)
        .await
        .map(Team::from)
        .map_err(|e| map_db_error("insert team", e))
    }

    async fn add_member(
        &mut self,
        team_id: TeamId,
        user_id: UserId,
        role: TeamRole,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO user_teams (team_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(team_id.as_i64())
            .bind(user_id.as_i64())
            .bind(role.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_db_error("add team member", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_db_error("commit transaction", e))
    }
}

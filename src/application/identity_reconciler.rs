//! IdentityReconciler - maps a remote identity-provider user onto exactly one
//! local user row and links the identity.
//!
//! Lookup order is external id, then normalized email, then create. A unique
//! violation on create means a concurrent first login won the race: the row
//! is re-read by the violated key and updated in place instead. The whole
//! reconciliation runs in one store transaction.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::identity::{
    AuthIdentity, IdentityTokens, NewIdentity, ReconciledProfile, RemoteUser, User,
    UserPreferences,
};
use crate::domain::session::AuthError;
use crate::ports::{IdentityProvider, IdentityStore, IdentityTransaction, StoreError, UniqueKey};

/// The resolved local user and its identity link.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub user: User,
    pub identity: AuthIdentity,
    /// True when the user row was created by this call.
    pub created: bool,
}

pub struct IdentityReconciler {
    store: Arc<dyn IdentityStore>,
    provider: Arc<dyn IdentityProvider>,
}

impl IdentityReconciler {
    pub fn new(store: Arc<dyn IdentityStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { store, provider }
    }

    /// Upsert the local user for `remote` and link the provider identity.
    ///
    /// `tokens` replace the link's stored pair when given; otherwise existing
    /// tokens are kept.
    ///
    /// # Errors
    ///
    /// - `Validation` if the remote profile has no id
    /// - `Conflict` if the remote email already belongs to a different local
    ///   user that is linked to another external id
    /// - `Store` on persistence failures
    pub async fn ensure_local_user(
        &self,
        remote: &RemoteUser,
        tokens: Option<&IdentityTokens>,
    ) -> Result<ReconcileOutcome, AuthError> {
        let profile = ReconciledProfile::from_remote(remote)?;
        let mut tx = self.store.begin().await?;

        let (user, created) = resolve_user(tx.as_mut(), &profile).await?;
        let identity = link_identity(
            tx.as_mut(),
            self.provider.name(),
            &user,
            &profile,
            tokens,
        )
        .await?;

        tx.commit().await?;

        if created {
            info!(user_id = %user.id, external_id = %profile.external_id, "Created local user");
        }
        Ok(ReconcileOutcome {
            user,
            identity,
            created,
        })
    }

    /// Local user for an external id, fetching and reconciling the remote
    /// profile when the user or its link is not known locally.
    pub async fn ensure_local_user_by_external_id(
        &self,
        external_id: &str,
        tokens: Option<&IdentityTokens>,
    ) -> Result<User, AuthError> {
        let user = self.store.find_user_by_external_id(external_id).await?;
        let identity = self
            .store
            .find_identity(self.provider.name(), external_id)
            .await?;

        if let (Some(user), Some(identity)) = (user, identity) {
            if let Some(tokens) = tokens {
                self.store.update_identity_tokens(identity.id, tokens).await?;
            }
            return Ok(user);
        }

        debug!(external_id, "Local user unknown, fetching remote profile");
        let remote = self.provider.get_user(external_id).await?;
        Ok(self.ensure_local_user(&remote, tokens).await?.user)
    }
}

/// Find or create the user row, retrying once on a unique-violation race.
async fn resolve_user(
    tx: &mut dyn IdentityTransaction,
    profile: &ReconciledProfile,
) -> Result<(User, bool), AuthError> {
    if let Some(user) = find_existing(tx, profile).await? {
        return Ok((update_in_place(tx, user, profile).await?, false));
    }

    match tx.insert_user(&profile.new_user()).await {
        Ok(user) => {
            tx.insert_preferences(&UserPreferences::defaults_for(user.id))
                .await?;
            Ok((user, true))
        }
        Err(StoreError::UniqueViolation(key)) => {
            debug!(?key, "Concurrent user creation detected, re-reading");
            let winner = match key {
                UniqueKey::UserExternalId => {
                    tx.find_user_by_external_id(&profile.external_id).await?
                }
                UniqueKey::UserEmail => match &profile.email {
                    Some(email) => tx.find_user_by_email(email).await?,
                    None => None,
                },
                _ => None,
            };
            let winner = winner.ok_or(StoreError::UniqueViolation(key))?;
            Ok((update_in_place(tx, winner, profile).await?, false))
        }
        Err(e) => Err(e.into()),
    }
}

async fn find_existing(
    tx: &mut dyn IdentityTransaction,
    profile: &ReconciledProfile,
) -> Result<Option<User>, StoreError> {
    if let Some(user) = tx.find_user_by_external_id(&profile.external_id).await? {
        return Ok(Some(user));
    }
    match &profile.email {
        Some(email) => tx.find_user_by_email(email).await,
        None => Ok(None),
    }
}

async fn update_in_place(
    tx: &mut dyn IdentityTransaction,
    mut user: User,
    profile: &ReconciledProfile,
) -> Result<User, AuthError> {
    if !profile.apply_to(&mut user) {
        return Ok(user);
    }
    match tx.update_user(&user).await {
        Ok(user) => Ok(user),
        Err(StoreError::UniqueViolation(UniqueKey::UserEmail)) => Err(AuthError::Conflict(
            "Email is already used by another account".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Upsert the `(provider, subject)` link; a conflict updates instead.
async fn link_identity(
    tx: &mut dyn IdentityTransaction,
    provider: &str,
    user: &User,
    profile: &ReconciledProfile,
    tokens: Option<&IdentityTokens>,
) -> Result<AuthIdentity, AuthError> {
    if let Some(link) = tx.find_identity(provider, &profile.external_id).await? {
        return relink(tx, link, user, profile, tokens).await;
    }

    let new_link = NewIdentity {
        user_id: user.id,
        provider: provider.to_string(),
        subject: profile.external_id.clone(),
        provider_email: profile.email.clone(),
        tokens: tokens.cloned(),
    };
    match tx.insert_identity(&new_link).await {
        Ok(link) => Ok(link),
        Err(StoreError::UniqueViolation(UniqueKey::IdentityProviderSubject)) => {
            let link = tx
                .find_identity(provider, &profile.external_id)
                .await?
                .ok_or(StoreError::NotFound)?;
            relink(tx, link, user, profile, tokens).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn relink(
    tx: &mut dyn IdentityTransaction,
    mut link: AuthIdentity,
    user: &User,
    profile: &ReconciledProfile,
    tokens: Option<&IdentityTokens>,
) -> Result<AuthIdentity, AuthError> {
    link.user_id = user.id;
    if profile.email.is_some() {
        link.provider_email = profile.email.clone();
    }
    if let Some(tokens) = tokens {
        link.set_tokens(tokens);
    }
    Ok(tx.update_identity(&link).await?)
}

//! Remote identity-provider profile and its projection onto a local user.

use crate::domain::foundation::{normalize_email, Timestamp, ValidationError};

use super::{NewUser, User};

/// A user record as the identity provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
    pub profile_picture_url: Option<String>,
    pub updated_at: Option<Timestamp>,
}

/// Local field values derived from a [`RemoteUser`].
///
/// Produced once per reconciliation so the create and update paths agree on
/// normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledProfile {
    pub external_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
    pub verified_at: Timestamp,
}

impl ReconciledProfile {
    pub fn from_remote(remote: &RemoteUser) -> Result<Self, ValidationError> {
        let external_id = remote.id.trim();
        if external_id.is_empty() {
            return Err(ValidationError::empty_field("external_id"));
        }

        let email = remote
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|email| !email.is_empty());

        Ok(Self {
            external_id: external_id.to_string(),
            email,
            name: display_name(remote.first_name.as_deref(), remote.last_name.as_deref()),
            avatar_url: non_blank(remote.profile_picture_url.as_deref()),
            email_verified: remote.email_verified,
            verified_at: remote.updated_at.unwrap_or_else(Timestamp::now),
        })
    }

    /// Field values for a user that does not exist locally yet.
    pub fn new_user(&self) -> NewUser {
        NewUser {
            email: self.email.clone(),
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
            external_id: Some(self.external_id.clone()),
            email_verified_at: self.email_verified.then_some(self.verified_at),
        }
    }

    /// Brings an existing user in line with the remote profile.
    ///
    /// Blank remote fields never erase local values. The verification
    /// timestamp is kept once set and cleared when the remote reports the
    /// address unverified. Returns whether anything changed.
    pub fn apply_to(&self, user: &mut User) -> bool {
        let mut changed = false;

        if user.external_id.as_deref() != Some(self.external_id.as_str()) {
            user.external_id = Some(self.external_id.clone());
            changed = true;
        }
        if let Some(email) = &self.email {
            if user.email.as_ref() != Some(email) {
                user.email = Some(email.clone());
                changed = true;
            }
        }
        if let Some(name) = &self.name {
            if user.name.as_ref() != Some(name) {
                user.name = Some(name.clone());
                changed = true;
            }
        }
        if let Some(avatar) = &self.avatar_url {
            if user.avatar_url.as_ref() != Some(avatar) {
                user.avatar_url = Some(avatar.clone());
                changed = true;
            }
        }

        match (self.email_verified, user.email_verified_at.is_some()) {
            (true, false) => {
                user.email_verified_at = Some(self.verified_at);
                changed = true;
            }
            (false, true) => {
                user.email_verified_at = None;
                changed = true;
            }
            _ => {}
        }

        changed
    }
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn display_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let parts: Vec<String> = [non_blank(first), non_blank(last)]
        .into_iter()
        .flatten()
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

//! Local user record, the anchor every linked identity points at.

use serde::Serialize;

use crate::domain::foundation::{Timestamp, UserId};

/// A local user row.
///
/// Email and external id are each unique among live (non-deleted) users.
/// Rows are never hard-deleted; `deleted_at` marks a soft delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub external_id: Option<String>,
    pub email_verified_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl User {
    /// True once the identity provider has confirmed the email address.
    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    /// True for soft-deleted rows.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Trimmed display name, if one is set and non-blank.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Replaces the email and drops verification.
    ///
    /// Returns `false` when the address is unchanged and nothing was touched.
    pub fn change_email(&mut self, email: String) -> bool {
        if self.email.as_deref() == Some(email.as_str()) {
            return false;
        }
        self.email = Some(email);
        self.email_verified_at = None;
        true
    }
}

/// Field values for a user row that has not been inserted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub external_id: Option<String>,
    pub email_verified_at: Option<Timestamp>,
}

impl NewUser {
    /// Materializes the row once the store has assigned an id.
    pub fn into_user(self, id: UserId, now: Timestamp) -> User {
        User {
            id,
            email: self.email,
            name: self.name,
            avatar_url: self.avatar_url,
            external_id: self.external_id,
            email_verified_at: self.email_verified_at,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        NewUser {
            email: Some("a@example.com".to_string()),
            name: Some("  Ada  ".to_string()),
            avatar_url: None,
            external_id: Some("user_01".to_string()),
            email_verified_at: Some(Timestamp::now()),
        }
        .into_user(UserId::new(1), Timestamp::now())
    }

    #[test]
    fn display_name_is_trimmed() {
        assert_eq!(user().display_name(), Some("Ada"));
    }

    #[test]
    fn blank_name_has_no_display_name() {
        let mut u = user();
        u.name = Some("   ".to_string());
        assert_eq!(u.display_name(), None);
    }

    #[test]
    fn change_email_clears_verification() {
        let mut u = user();
        assert!(u.change_email("b@example.com".to_string()));
        assert_eq!(u.email.as_deref(), Some("b@example.com"));
        assert!(!u.is_email_verified());
    }

    #[test]
    fn change_email_to_same_address_is_noop() {
        let mut u = user();
        assert!(!u.change_email("a@example.com".to_string()));
        assert!(u.is_email_verified());
    }

    #[test]
    fn new_user_materializes_live_row() {
        let u = user();
        assert_eq!(u.id, UserId::new(1));
        assert!(!u.is_deleted());
        assert_eq!(u.created_at, u.updated_at);
    }
}

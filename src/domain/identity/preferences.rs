//! Per-user preferences row created alongside a new user.

use serde::Serialize;

use crate::domain::foundation::UserId;

pub const DEFAULT_THEME: &str = "system";
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPreferences {
    pub user_id: UserId,
    pub theme: String,
    pub language: String,
}

impl UserPreferences {
    /// Defaults written on first user creation.
    pub fn defaults_for(user_id: UserId) -> Self {
        Self {
            user_id,
            theme: DEFAULT_THEME.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

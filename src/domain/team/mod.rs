//! Team module - collaboration containers and memberships.
//!
//! Teams and users reference each other only through integer ids; the
//! membership row carries the role.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{TeamId, Timestamp, UserId, ValidationError};

const FALLBACK_TEAM_NAME: &str = "My team";

/// A member's role within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Owner,
    Admin,
    Regular,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::Admin => "admin",
            TeamRole::Regular => "regular",
        }
    }

    /// Owners and admins may manage members.
    pub fn can_manage_members(&self) -> bool {
        matches!(self, TeamRole::Owner | TeamRole::Admin)
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(TeamRole::Owner),
            "admin" => Ok(TeamRole::Admin),
            "regular" => Ok(TeamRole::Regular),
            other => Err(ValidationError::invalid_format(
                "role",
                format!("unknown team role '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub icon: Option<String>,
    pub owner_id: UserId,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTeam {
    pub name: String,
    pub icon: Option<String>,
    pub owner_id: UserId,
}

impl NewTeam {
    /// The team auto-provisioned for a freshly verified user.
    pub fn default_for(owner_id: UserId, display_name: Option<&str>) -> Self {
        Self {
            name: default_team_name(display_name),
            icon: None,
            owner_id,
        }
    }

    pub fn into_team(self, id: TeamId, now: Timestamp) -> Team {
        Team {
            id,
            name: self.name,
            icon: self.icon,
            owner_id: self.owner_id,
            created_at: now,
        }
    }
}

/// A team together with the viewing user's role in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamMembership {
    pub team: Team,
    pub role: TeamRole,
}

/// "<name>'s team", or "My team" when the user has no usable name.
pub fn default_team_name(display_name: Option<&str>) -> String {
    match display_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("{}'s team", name),
        None => FALLBACK_TEAM_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_team_name_uses_display_name() {
        assert_eq!(default_team_name(Some("Ada Lovelace")), "Ada Lovelace's team");
        assert_eq!(default_team_name(Some("  Bo ")), "Bo's team");
    }

    #[test]
    fn default_team_name_falls_back_without_name() {
        assert_eq!(default_team_name(None), "My team");
        assert_eq!(default_team_name(Some("   ")), "My team");
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [TeamRole::Owner, TeamRole::Admin, TeamRole::Regular] {
            assert_eq!(role.as_str().parse::<TeamRole>().unwrap(), role);
        }
        assert!("superuser".parse::<TeamRole>().is_err());
    }

    #[test]
    fn only_owner_and_admin_manage_members() {
        assert!(TeamRole::Owner.can_manage_members());
        assert!(TeamRole::Admin.can_manage_members());
        assert!(!TeamRole::Regular.can_manage_members());
    }

    #[test]
    fn default_team_is_owned_by_user() {
        let team = NewTeam::default_for(UserId::new(2), None);
        assert_eq!(team.owner_id, UserId::new(2));
        assert_eq!(team.name, "My team");
    }
}

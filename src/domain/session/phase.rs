//! Per-request session lifecycle.

use serde::Serialize;

use crate::domain::foundation::StateMachine;

/// Where a request's session stands.
///
/// ```text
/// Anonymous -> Authenticating -> Active -> Expired -> Refreshing -> Active
///                   |              |                      |
///                   v              v                      v
///               Anonymous       Revoked               Anonymous
/// ```
///
/// Only `Active` permits protected operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Anonymous,
    Authenticating,
    Active,
    Expired,
    Refreshing,
    Revoked,
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Active)
    }
}

impl StateMachine for SessionPhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SessionPhase::*;
        match self {
            Anonymous => vec![Authenticating],
            Authenticating => vec![Active, Expired, Anonymous],
            Active => vec![Expired, Revoked],
            Expired => vec![Refreshing, Anonymous],
            Refreshing => vec![Active, Anonymous],
            Revoked => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_active() {
        let phase = SessionPhase::default()
            .transition_to(SessionPhase::Authenticating)
            .and_then(|p| p.transition_to(SessionPhase::Active))
            .unwrap();
        assert!(phase.is_active());
    }

    #[test]
    fn refresh_path_returns_to_active() {
        let phase = SessionPhase::Authenticating
            .transition_to(SessionPhase::Expired)
            .and_then(|p| p.transition_to(SessionPhase::Refreshing))
            .and_then(|p| p.transition_to(SessionPhase::Active))
            .unwrap();
        assert_eq!(phase, SessionPhase::Active);
    }

    #[test]
    fn failed_refresh_falls_back_to_anonymous() {
        assert!(SessionPhase::Refreshing.can_transition_to(&SessionPhase::Anonymous));
        assert!(SessionPhase::Expired.can_transition_to(&SessionPhase::Anonymous));
    }

    #[test]
    fn anonymous_cannot_skip_to_active() {
        assert!(SessionPhase::Anonymous
            .transition_to(SessionPhase::Active)
            .is_err());
    }

    #[test]
    fn revoked_is_terminal() {
        assert!(SessionPhase::Revoked.is_terminal());
        assert!(SessionPhase::Active.can_transition_to(&SessionPhase::Revoked));
    }

    #[test]
    fn only_active_is_active() {
        for phase in [
            SessionPhase::Anonymous,
            SessionPhase::Authenticating,
            SessionPhase::Expired,
            SessionPhase::Refreshing,
            SessionPhase::Revoked,
        ] {
            assert!(!phase.is_active());
        }
    }
}

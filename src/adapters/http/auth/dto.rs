//! HTTP DTOs for the auth endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::identity::User;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Body carrying just an email address.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmVerificationRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub confirmation_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Clone, Deserialize)]
pub struct ConfirmPasswordResetRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for ConfirmPasswordResetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConfirmPasswordResetRequest { .. }")
    }
}

/// Query of `GET /auth/{provider}/authorize`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub redirect: Option<String>,
}

/// OAuth callback parameters, from the query string or a form post.
#[derive(Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &self.code.as_ref().map(|_| "<redacted>"))
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Public view of a local user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserPayload {
    pub id: i64,
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub email_verified: bool,
}

impl From<&User> for UserPayload {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.as_i64(),
            external_id: user.external_id.clone(),
            email: user.email.clone(),
            name: user.display_name().map(str::to_string),
            avatar_url: user.avatar_url.clone(),
            email_verified: user.is_email_verified(),
        }
    }
}

/// `{"success": true, "user": {..}}`
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserPayload,
}

impl UserResponse {
    pub fn new(user: &User) -> Self {
        Self {
            success: true,
            user: user.into(),
        }
    }
}

/// Message plus the user, as returned by email confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct UserMessageResponse {
    pub success: bool,
    pub message: String,
    pub user: UserPayload,
}

impl UserMessageResponse {
    pub fn new(message: impl Into<String>, user: &User) -> Self {
        Self {
            success: true,
            message: message.into(),
            user: user.into(),
        }
    }
}

/// Message plus the id the client confirms the email against.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationResponse {
    pub success: bool,
    pub message: String,
    pub confirmation_id: String,
}

impl ConfirmationResponse {
    pub fn new(message: impl Into<String>, confirmation_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            confirmation_id: confirmation_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Timestamp, UserId};

    fn user() -> User {
        let now = Timestamp::now();
        User {
            id: UserId::new(42),
            email: Some("a@example.com".to_string()),
            name: Some("  ".to_string()),
            avatar_url: None,
            external_id: Some("user_a".to_string()),
            email_verified_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn user_payload_omits_absent_fields() {
        let json = serde_json::to_value(UserPayload::from(&user())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 42,
                "external_id": "user_a",
                "email": "a@example.com",
                "email_verified": false
            })
        );
    }

    #[test]
    fn callback_params_accept_partial_input() {
        let params: CallbackParams =
            serde_json::from_value(serde_json::json!({"error": "access_denied"})).unwrap();
        assert!(params.code.is_none());
        assert_eq!(params.error.as_deref(), Some("access_denied"));
    }

    #[test]
    fn secrets_stay_out_of_debug_output() {
        let login = LoginRequest {
            email: "a@example.com".to_string(),
            password: "Str0ng!Pass".to_string(),
        };
        assert!(!format!("{:?}", login).contains("Str0ng"));

        let params = CallbackParams {
            code: Some("code_secret".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", params).contains("code_secret"));
    }
}

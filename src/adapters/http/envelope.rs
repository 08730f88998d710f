//! Uniform JSON envelope and the HTTP mapping of [`AuthError`].
//!
//! Every error body is `{"success": false, "message": .., "code": ..}`.
//! Any 401 also clears the session cookies so the client never retries with
//! a doomed token.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::domain::session::AuthError;

use super::cookies::SessionCookies;

/// Error body sent for every failed request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Wraps an [`AuthError`] so handlers can return it directly.
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        ApiError(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn log(&self) {
        let error = &self.0;
        if error.is_transient() {
            error!(error = %error, code = %error.code(), "Request failed");
        } else if matches!(error, AuthError::Upstream(_)) {
            warn!(error = %error, "Identity provider rejected request");
        } else {
            debug!(error = %error, code = %error.code(), "Request rejected");
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status();
        let body = Json(ErrorBody::new(
            self.0.public_message(),
            self.0.code().to_string(),
        ));

        if self.0.requires_reauthentication() {
            let jar = SessionCookies::clear(CookieJar::new());
            (status, jar, body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// `{"success": true, "message": ..}`
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ProviderError;
    use axum::http::header::SET_COOKIE;

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }

    #[test]
    fn statuses_follow_error_taxonomy() {
        assert_eq!(
            ApiError(AuthError::validation("email", "bad")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError(AuthError::SessionDead).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError(AuthError::Upstream(ProviderError::Conflict)).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ApiError(AuthError::RateLimited).status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn unauthenticated_response_clears_both_cookies() {
        let response = ApiError(AuthError::Unauthenticated).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("access_token=;")));
        assert!(cookies.iter().any(|c| c.starts_with("session_state=;")));
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[test]
    fn non_401_errors_leave_cookies_alone() {
        let response = ApiError(AuthError::Forbidden).into_response();
        assert!(set_cookies(&response).is_empty());
    }

    #[test]
    fn upstream_detail_never_reaches_body() {
        let error = AuthError::Upstream(ProviderError::Rejected {
            status: 500,
            detail: "stack trace at line 42".to_string(),
        });
        let body = ErrorBody::new(error.public_message(), error.code().to_string());
        assert!(!body.message.contains("stack trace"));
        assert_eq!(body.code, "UPSTREAM_ERROR");
        assert!(!body.success);
    }
}

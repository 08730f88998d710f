//! HTTP handlers for the auth endpoints.
//!
//! These handlers connect axum routes to the auth command handlers and own
//! the cookie side of every response.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Form, Path, Query, State},
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use tracing::{debug, info};

use crate::adapters::http::cookies::{OAuthState, SessionCookies};
use crate::adapters::http::envelope::{ApiError, MessageResponse};
use crate::adapters::http::middleware::RequireAuth;
use crate::adapters::http::request_meta::ClientMeta;
use crate::application::handlers::{
    ChangeEmailCommand, ChangeEmailHandler, ConfirmPasswordResetCommand,
    ConfirmPasswordResetHandler, ConfirmVerificationCommand, ConfirmVerificationHandler,
    RefreshSessionCommand, RefreshSessionHandler, RequestPasswordResetHandler,
    ResendVerificationHandler, SendVerificationHandler, SignInCommand, SignInHandler,
    SignOutHandler, SignUpCommand, SignUpHandler,
};
use crate::config::{AuthConfig, SessionConfig};
use crate::domain::session::{AuthError, RequestMeta};
use crate::ports::{AuthorizationRequest, IdentityProvider};

use super::dto::{
    AuthorizeQuery, CallbackParams, ConfirmPasswordResetRequest, ConfirmVerificationRequest,
    ConfirmationResponse, EmailRequest, HealthResponse, LoginRequest, SignUpRequest,
    UserMessageResponse, UserResponse,
};
use super::redirect::{app_location, sanitize_redirect};

const SOCIAL_PROVIDERS: &[(&str, &str)] = &[("google", "GoogleOAuth"), ("github", "GitHubOAuth")];

// ════════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════════

/// Command handlers and settings shared by the auth routes.
#[derive(Clone)]
pub struct AuthHandlers {
    pub sign_up: Arc<SignUpHandler>,
    pub sign_in: Arc<SignInHandler>,
    pub refresh: Arc<RefreshSessionHandler>,
    pub sign_out: Arc<SignOutHandler>,
    pub send_verification: Arc<SendVerificationHandler>,
    pub resend_verification: Arc<ResendVerificationHandler>,
    pub confirm_verification: Arc<ConfirmVerificationHandler>,
    pub request_password_reset: Arc<RequestPasswordResetHandler>,
    pub confirm_password_reset: Arc<ConfirmPasswordResetHandler>,
    pub change_email: Arc<ChangeEmailHandler>,
    pub provider: Arc<dyn IdentityProvider>,
    pub cookies: SessionCookies,
    pub auth_config: Arc<AuthConfig>,
    pub session_config: Arc<SessionConfig>,
}

impl AuthHandlers {
    fn sanitize(&self, candidate: Option<&str>) -> String {
        sanitize_redirect(
            candidate,
            self.session_config.app_url(),
            &self.session_config.default_redirect_path,
        )
    }
}

/// Map a body rejection to the envelope instead of axum's plain-text reply.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        debug!(error = %rejection, "Rejected request body");
        ApiError(AuthError::validation("body", "Request body is not valid JSON for this endpoint"))
    })
}

/// `302 Found` to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

fn social_provider(provider: &str) -> Result<&'static str, ApiError> {
    SOCIAL_PROVIDERS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, remote)| *remote)
        .ok_or(ApiError(AuthError::NotFound))
}

// ════════════════════════════════════════════════════════════════════════════════
// Health
// ════════════════════════════════════════════════════════════════════════════════

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "ok",
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Registration and login
// ════════════════════════════════════════════════════════════════════════════════

/// POST /auth/signup
pub async fn sign_up(
    State(handlers): State<AuthHandlers>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = body(payload)?;
    let result = handlers
        .sign_up
        .handle(SignUpCommand {
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ConfirmationResponse::new("User registered", result.confirmation_id)),
    )
        .into_response())
}

/// POST /auth/login
pub async fn login(
    State(handlers): State<AuthHandlers>,
    ClientMeta(meta): ClientMeta,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = body(payload)?;
    let signed_in = handlers
        .sign_in
        .handle(SignInCommand::password(&req.email, &req.password, meta))
        .await?;

    let jar = handlers.cookies.set_session(jar, &signed_in.session)?;
    Ok((jar, Json(UserResponse::new(&signed_in.user))).into_response())
}

// ════════════════════════════════════════════════════════════════════════════════
// OAuth
// ════════════════════════════════════════════════════════════════════════════════

/// GET /auth/:provider/authorize
pub async fn authorize(
    State(handlers): State<AuthHandlers>,
    Path(provider): Path<String>,
    Query(query): Query<AuthorizeQuery>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let remote_provider = social_provider(&provider)?;
    let redirect = handlers.sanitize(query.redirect.as_deref());

    let (state, cookie) = handlers
        .cookies
        .seal_oauth_state(&OAuthState::new(Some(redirect)))
        .map_err(|e| AuthError::internal(format!("Failed to seal OAuth state: {}", e)))?;

    let connection_id = handlers
        .auth_config
        .connection_id_for(&provider)
        .map(str::to_string);
    let request = AuthorizationRequest {
        provider: connection_id.is_none().then(|| remote_provider.to_string()),
        connection_id,
        redirect_uri: handlers.auth_config.redirect_uri_for(&provider),
        state,
    };
    let url = handlers
        .provider
        .authorization_url(&request)
        .map_err(AuthError::from)?;

    Ok((jar.add(cookie), found(&url)).into_response())
}

/// GET /auth/:provider/callback
pub async fn callback_query(
    State(handlers): State<AuthHandlers>,
    Path(provider): Path<String>,
    ClientMeta(meta): ClientMeta,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    finish_callback(&handlers, &provider, params, jar, meta).await
}

/// POST /auth/:provider/callback
pub async fn callback_form(
    State(handlers): State<AuthHandlers>,
    Path(provider): Path<String>,
    ClientMeta(meta): ClientMeta,
    jar: CookieJar,
    Form(params): Form<CallbackParams>,
) -> Result<Response, ApiError> {
    finish_callback(&handlers, &provider, params, jar, meta).await
}

async fn finish_callback(
    handlers: &AuthHandlers,
    provider: &str,
    params: CallbackParams,
    jar: CookieJar,
    meta: RequestMeta,
) -> Result<Response, ApiError> {
    social_provider(provider)?;

    if let Some(error) = params.error.as_deref().filter(|e| !e.trim().is_empty()) {
        debug!(provider, error, description = ?params.error_description, "OAuth provider returned an error");
        return Err(AuthError::validation("error", "Authentication failed").into());
    }
    let code = params
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AuthError::validation("code", "Missing authorization code"))?;
    if !SessionCookies::oauth_state_matches(&jar, params.state.as_deref()) {
        debug!(provider, "OAuth state mismatch");
        return Err(AuthError::validation("state", "Invalid OAuth state").into());
    }

    let requested = params
        .state
        .as_deref()
        .and_then(|state| handlers.cookies.open_oauth_state(state))
        .and_then(|state| state.redirect);
    let redirect = handlers.sanitize(requested.as_deref());

    let signed_in = handlers
        .sign_in
        .handle(SignInCommand::authorization_code(code, meta))
        .await?;

    let jar = handlers.cookies.set_session(jar, &signed_in.session)?;
    let jar = SessionCookies::clear_oauth_state(jar);
    info!(provider, user_id = %signed_in.user.id, "OAuth sign-in completed");
    Ok((
        jar,
        found(&app_location(handlers.session_config.app_url(), &redirect)),
    )
        .into_response())
}

// ════════════════════════════════════════════════════════════════════════════════
// Session
// ════════════════════════════════════════════════════════════════════════════════

/// POST /auth/refresh
pub async fn refresh(
    State(handlers): State<AuthHandlers>,
    ClientMeta(meta): ClientMeta,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let bundle = handlers
        .cookies
        .session_bundle(&jar)
        .ok_or(AuthError::Unauthenticated)?;
    let signed_in = handlers
        .refresh
        .handle(RefreshSessionCommand { bundle, meta })
        .await?;

    let jar = handlers.cookies.set_session(jar, &signed_in.session)?;
    Ok((jar, Json(UserResponse::new(&signed_in.user))).into_response())
}

/// POST /auth/logout
///
/// Always succeeds and always clears the cookies.
pub async fn logout(State(handlers): State<AuthHandlers>, jar: CookieJar) -> Response {
    let bundle = handlers.cookies.session_bundle(&jar);
    handlers.sign_out.handle(bundle).await;
    (
        SessionCookies::clear(jar),
        Json(MessageResponse::ok("Logged out")),
    )
        .into_response()
}

/// GET /auth/me
pub async fn me(RequireAuth(auth): RequireAuth) -> Json<UserResponse> {
    Json(UserResponse::new(&auth.user))
}

// ════════════════════════════════════════════════════════════════════════════════
// Email verification
// ════════════════════════════════════════════════════════════════════════════════

/// POST /auth/verify/send
pub async fn send_verification(
    State(handlers): State<AuthHandlers>,
    RequireAuth(auth): RequireAuth,
) -> Result<Json<MessageResponse>, ApiError> {
    handlers.send_verification.handle(&auth.user).await?;
    Ok(Json(MessageResponse::ok("Verification email sent")))
}

/// POST /auth/verify/confirm
pub async fn confirm_verification(
    State(handlers): State<AuthHandlers>,
    payload: Result<Json<ConfirmVerificationRequest>, JsonRejection>,
) -> Result<Json<UserMessageResponse>, ApiError> {
    let req = body(payload)?;
    let result = handlers
        .confirm_verification
        .handle(ConfirmVerificationCommand {
            code: req.code,
            confirmation_id: req.confirmation_id,
            user_id: req.user_id,
        })
        .await?;
    Ok(Json(UserMessageResponse::new("Email verified", &result.user)))
}

/// POST /auth/resend-email
pub async fn resend_verification(
    State(handlers): State<AuthHandlers>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<ConfirmationResponse>, ApiError> {
    let req = body(payload)?;
    let result = handlers.resend_verification.handle(&req.email).await?;
    Ok(Json(ConfirmationResponse::new(
        "Verification email sent",
        result.confirmation_id,
    )))
}

// ════════════════════════════════════════════════════════════════════════════════
// Password reset and email change
// ════════════════════════════════════════════════════════════════════════════════

/// POST /auth/password/reset
pub async fn request_password_reset(
    State(handlers): State<AuthHandlers>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let req = body(payload)?;
    handlers.request_password_reset.handle(&req.email).await?;
    Ok(Json(MessageResponse::ok("Password reset email sent")))
}

/// POST /auth/password/confirm
pub async fn confirm_password_reset(
    State(handlers): State<AuthHandlers>,
    payload: Result<Json<ConfirmPasswordResetRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let req = body(payload)?;
    handlers
        .confirm_password_reset
        .handle(ConfirmPasswordResetCommand {
            token: req.token,
            password: req.password,
        })
        .await?;
    Ok(Json(MessageResponse::ok("Password updated")))
}

/// POST /auth/email
pub async fn change_email(
    State(handlers): State<AuthHandlers>,
    RequireAuth(auth): RequireAuth,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let req = body(payload)?;
    let user = handlers
        .change_email
        .handle(ChangeEmailCommand {
            user: auth.user,
            email: req.email,
        })
        .await?;
    Ok(Json(UserResponse::new(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_google_and_github_are_social_providers() {
        assert_eq!(social_provider("google").unwrap(), "GoogleOAuth");
        assert_eq!(social_provider("github").unwrap(), "GitHubOAuth");
        assert_eq!(social_provider("okta").unwrap_err().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn found_is_a_302_with_location() {
        let response = found("https://app.example.com/teams");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "https://app.example.com/teams"
        );
    }

    #[test]
    fn handler_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<AuthHandlers>();
    }
}

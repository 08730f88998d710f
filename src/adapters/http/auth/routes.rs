//! Axum router configuration for auth endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    authorize, callback_form, callback_query, change_email, confirm_password_reset,
    confirm_verification, health, login, logout, me, refresh, request_password_reset,
    resend_verification, send_verification, sign_up, AuthHandlers,
};

/// Create the auth API router.
///
/// # Routes
///
/// ## Public
/// - `GET /health`
/// - `POST /auth/signup`, `POST /auth/login`
/// - `GET /auth/:provider/authorize`, `GET|POST /auth/:provider/callback`
/// - `POST /auth/refresh`, `POST /auth/logout`
/// - `POST /auth/verify/confirm`, `POST /auth/resend-email`
/// - `POST /auth/password/reset`, `POST /auth/password/confirm`
///
/// ## Session required
/// - `GET /auth/me`
/// - `POST /auth/verify/send`
/// - `POST /auth/email`
pub fn auth_routes(handlers: AuthHandlers) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(sign_up))
        .route("/auth/login", post(login))
        .route("/auth/:provider/authorize", get(authorize))
        .route(
            "/auth/:provider/callback",
            get(callback_query).post(callback_form),
        )
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/verify/send", post(send_verification))
        .route("/auth/verify/confirm", post(confirm_verification))
        .route("/auth/resend-email", post(resend_verification))
        .route("/auth/password/reset", post(request_password_reset))
        .route("/auth/password/confirm", post(confirm_password_reset))
        .route("/auth/email", post(change_email))
        .with_state(handlers)
}

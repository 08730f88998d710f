//! Authentication middleware and extractors for axum.
//!
//! This module provides:
//! - `auth_middleware` - Layer that authenticates the `access_token` cookie
//!   and injects an [`AuthContext`] into request extensions
//! - `RequireAuth` - Extractor that requires an active session
//! - `OptionalAuth` - Extractor for optional authentication
//!
//! # Architecture
//!
//! ```text
//! Request → auth_middleware → AuthenticateRequestHandler → AuthContext in extensions
//!                 │                                              ↓
//!                 │                              Handler → RequireAuth reads extensions
//!                 └─ refreshed session? → reissue cookies on the response
//! ```
//!
//! Public paths (login, signup, OAuth, refresh, logout, password reset,
//! email confirmation, health and every `OPTIONS` preflight) skip the gate.
//! Everything else without an active session gets a 401 that also clears
//! the session cookies.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use tracing::{debug, warn};

use crate::adapters::http::cookies::SessionCookies;
use crate::adapters::http::envelope::{ApiError, ErrorBody};
use crate::adapters::http::request_meta::request_meta;
use crate::application::handlers::{AuthenticateRequestHandler, AuthenticatedRequest};
use crate::domain::identity::User;
use crate::domain::session::{SessionPhase, TokenClaims};

/// Auth middleware state.
#[derive(Clone)]
pub struct AuthState {
    pub handler: Arc<AuthenticateRequestHandler>,
    pub cookies: SessionCookies,
}

impl AuthState {
    pub fn new(handler: Arc<AuthenticateRequestHandler>, cookies: SessionCookies) -> Self {
        Self { handler, cookies }
    }
}

/// What downstream handlers know about the caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub email: Option<String>,
    pub user: User,
    pub claims: TokenClaims,
    pub phase: SessionPhase,
}

impl From<&AuthenticatedRequest> for AuthContext {
    fn from(request: &AuthenticatedRequest) -> Self {
        Self {
            email: request
                .user
                .email
                .clone()
                .or_else(|| request.claims.email.clone()),
            user: request.user.clone(),
            claims: request.claims.clone(),
            phase: request.phase,
        }
    }
}

const PUBLIC_PATHS: &[&str] = &[
    "/health",
    "/auth/login",
    "/auth/signup",
    "/auth/refresh",
    "/auth/logout",
    "/auth/password/reset",
    "/auth/password/confirm",
    "/auth/resend-email",
    "/auth/verify/confirm",
];

/// Paths and methods that never require a session.
pub fn is_public(method: &Method, path: &str) -> bool {
    if method == Method::OPTIONS {
        return true;
    }
    let path = match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    };
    if PUBLIC_PATHS.contains(&path) || path.starts_with("/auth/callback") {
        return true;
    }
    // /auth/{provider}/authorize and /auth/{provider}/callback
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    matches!(
        segments.as_slice(),
        ["auth", provider, "authorize" | "callback"] if !provider.is_empty()
    )
}

/// Authentication middleware for cookie sessions.
///
/// This middleware:
/// 1. Lets public paths through untouched
/// 2. Reads the `access_token` cookie
/// 3. Runs the request through `AuthenticateRequestHandler`, which may
///    refresh an expired token
/// 4. On success, injects `AuthContext` into request extensions and
///    reissues the cookies when the session was refreshed
/// 5. On any failure, returns 401 and clears the session cookies
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let jar = CookieJar::from_headers(request.headers());
    let token = SessionCookies::access_token(&jar);
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let meta = request_meta(request.headers(), peer);

    let authenticated = match state.handler.handle(token.as_deref(), &meta).await {
        Ok(authenticated) => authenticated,
        Err(e) => return ApiError(e).into_response(),
    };

    request
        .extensions_mut()
        .insert(AuthContext::from(&authenticated));
    let response = next.run(request).await;

    match authenticated.refreshed {
        Some(session) => match state.cookies.set_session(CookieJar::new(), &session) {
            Ok(jar) => {
                debug!(user_id = %authenticated.user.id, "Reissued refreshed session cookies");
                (jar, response).into_response()
            }
            Err(e) => {
                warn!(error = %e, "Failed to reissue refreshed session cookies");
                response
            }
        },
        None => response,
    }
}

/// Extractor that requires an active session.
///
/// Use this extractor in handlers that require an authenticated user.
/// If the auth middleware did not attach an active `AuthContext`, returns
/// 401 Unauthorized.
///
/// # Example
///
/// ```ignore
/// async fn me(RequireAuth(auth): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", auth.user.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .filter(|auth| auth.phase.is_active())
            .cloned()
            .map(RequireAuth)
            .ok_or(AuthRejection::Unauthenticated)
    }
}

/// Extractor for optional authentication.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<AuthContext>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<AuthContext>()
            .filter(|auth| auth.phase.is_active())
            .cloned();
        Ok(OptionalAuth(auth))
    }
}

/// Rejection type for authentication failures.
#[derive(Debug, Clone)]
pub enum AuthRejection {
    /// No active session was attached to the request.
    Unauthenticated,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                SessionCookies::clear(CookieJar::new()),
                Json(ErrorBody::new("Authentication required", "UNAUTHENTICATED")),
            )
                .into_response(),
        }
    }
}

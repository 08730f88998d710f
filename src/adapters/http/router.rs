//! Router composition: wires the application handlers to the auth routes
//! and wraps them in the session gate and the tower-http stack.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::application::handlers::{
    AuthenticateRequestHandler, ChangeEmailHandler, ConfirmPasswordResetHandler,
    ConfirmVerificationHandler, RefreshSessionHandler, RequestPasswordResetHandler,
    ResendVerificationHandler, SendVerificationHandler, SignInHandler, SignOutHandler,
    SignUpHandler,
};
use crate::application::{
    CredentialVerifier, DefaultTeamProvisioner, IdentityReconciler, SessionManager,
};
use crate::config::AppConfig;
use crate::ports::{IdentityProvider, IdentityStore, TokenVerifier};

use super::auth::{auth_routes, AuthHandlers};
use super::cookies::SessionCookies;
use super::middleware::{auth_middleware, AuthState};

/// Port implementations the router is built on.
#[derive(Clone)]
pub struct AppDependencies {
    pub provider: Arc<dyn IdentityProvider>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub store: Arc<dyn IdentityStore>,
}

/// Build the complete HTTP application.
pub fn build_router(config: &AppConfig, deps: AppDependencies) -> Router {
    let AppDependencies {
        provider,
        verifier,
        store,
    } = deps;

    let sessions = Arc::new(SessionManager::new(
        provider.clone(),
        verifier,
        CredentialVerifier::from_strategy(config.auth.credential_strategy),
    ));
    let reconciler = Arc::new(IdentityReconciler::new(store.clone(), provider.clone()));
    let teams = Arc::new(DefaultTeamProvisioner::new(store.clone()));
    let cookies = SessionCookies::from_config(config);

    let handlers = AuthHandlers {
        sign_up: Arc::new(SignUpHandler::new(provider.clone(), reconciler.clone())),
        sign_in: Arc::new(SignInHandler::new(
            sessions.clone(),
            reconciler.clone(),
            teams.clone(),
        )),
        refresh: Arc::new(RefreshSessionHandler::new(
            sessions.clone(),
            reconciler.clone(),
        )),
        sign_out: Arc::new(SignOutHandler::new(sessions.clone())),
        send_verification: Arc::new(SendVerificationHandler::new(provider.clone())),
        resend_verification: Arc::new(ResendVerificationHandler::new(provider.clone())),
        confirm_verification: Arc::new(ConfirmVerificationHandler::new(
            provider.clone(),
            reconciler.clone(),
            teams,
        )),
        request_password_reset: Arc::new(RequestPasswordResetHandler::new(
            provider.clone(),
            config.session.password_reset_url(),
        )),
        confirm_password_reset: Arc::new(ConfirmPasswordResetHandler::new(provider.clone())),
        change_email: Arc::new(ChangeEmailHandler::new(
            provider.clone(),
            store.clone(),
            reconciler,
        )),
        provider,
        cookies: cookies.clone(),
        auth_config: Arc::new(config.auth.clone()),
        session_config: Arc::new(config.session.clone()),
    };

    let gate = AuthState::new(
        Arc::new(AuthenticateRequestHandler::new(sessions, store)),
        cookies,
    );

    auth_routes(handlers)
        .layer(middleware::from_fn_with_state(gate, auth_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors_layer(config))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_secs,
                ))),
        )
}

/// Credentialed CORS for the configured origins, or `app_url` when none
/// are set. Unparseable entries are skipped.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let mut configured = config.server.cors_origins_list();
    if configured.is_empty() {
        configured.push(config.session.app_url().to_string());
    }
    let origins: Vec<HeaderValue> = configured
        .into_iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

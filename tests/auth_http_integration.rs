//! Integration tests for the auth HTTP surface.
//!
//! These tests drive the complete router (session gate, cookies, handlers)
//! with `tower::ServiceExt::oneshot` against the in-memory store and the
//! mock identity provider.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use blueprint_auth::adapters::auth::{MockIdentityProvider, MockTokenVerifier};
use blueprint_auth::adapters::http::{build_router, AppDependencies};
use blueprint_auth::adapters::memory::InMemoryIdentityStore;
use blueprint_auth::config::AppConfig;
use blueprint_auth::domain::foundation::Timestamp;
use blueprint_auth::ports::{IdentityStore, ProviderError};

const APP_URL: &str = "https://app.example.com";
const PASSWORD: &str = "Str0ng!Pass";

// =============================================================================
// Test Infrastructure
// =============================================================================

fn config(strategy: &str) -> AppConfig {
    serde_json::from_value(json!({
        "database": { "url": "postgresql://unused@localhost/test" },
        "auth": {
            "client_id": "client_test",
            "api_key": "sk_test",
            "credential_strategy": strategy,
            "oauth_redirect_uri": "https://api.example.com/auth/{provider}/callback"
        },
        "session": {
            "cookie_secret": "integration-test-cookie-secret",
            "app_url": APP_URL
        }
    }))
    .unwrap()
}

struct TestApp {
    router: Router,
    provider: Arc<MockIdentityProvider>,
    tokens: Arc<MockTokenVerifier>,
    store: InMemoryIdentityStore,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    /// `name -> value` for every Set-Cookie header.
    fn cookies(&self) -> HashMap<String, String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|raw| {
                let pair = raw.split(';').next()?;
                let (name, value) = pair.split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }

    fn raw_cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|raw| raw.starts_with(&format!("{}=", name)))
            .map(str::to_string)
    }

    fn location(&self) -> String {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    fn assert_session_cleared(&self) {
        for name in ["access_token", "session_state"] {
            let raw = self
                .raw_cookie(name)
                .unwrap_or_else(|| panic!("{} was not cleared", name));
            assert!(raw.starts_with(&format!("{}=;", name)), "{}", raw);
            assert!(raw.contains("Max-Age=0"), "{}", raw);
            assert!(raw.contains("1970"), "{}", raw);
        }
    }
}

fn test_app(strategy: &str) -> TestApp {
    let tokens = Arc::new(MockTokenVerifier::new());
    let provider = Arc::new(
        MockIdentityProvider::new()
            .with_verifier(tokens.clone())
            .with_user(
                MockIdentityProvider::remote_user("user_a", "a@example.com", true),
                Some(PASSWORD),
            )
            .with_user(
                MockIdentityProvider::remote_user("user_u", "u@example.com", false),
                Some(PASSWORD),
            )
            .with_oauth_code(
                "code_b",
                MockIdentityProvider::remote_user("user_b", "b@example.com", true),
            ),
    );
    let store = InMemoryIdentityStore::new();
    let router = build_router(
        &config(strategy),
        AppDependencies {
            provider: provider.clone(),
            verifier: tokens.clone(),
            store: Arc::new(store.clone()),
        },
    );
    TestApp {
        router,
        provider,
        tokens,
        store,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn post(&self, uri: &str, body: Value, cookies: &str) -> Reply {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if !cookies.is_empty() {
            builder = builder.header(header::COOKIE, cookies);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn get(&self, uri: &str, cookies: &str) -> Reply {
        let mut builder = Request::builder().uri(uri);
        if !cookies.is_empty() {
            builder = builder.header(header::COOKIE, cookies);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Logs user_a in and returns the cookie header for later requests.
    async fn login_a(&self) -> (Reply, String) {
        let reply = self
            .post(
                "/auth/login",
                json!({"email": "a@example.com", "password": PASSWORD}),
                "",
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        let cookies = reply.cookies();
        let header = format!(
            "access_token={}; session_state={}",
            cookies["access_token"], cookies["session_state"]
        );
        (reply, header)
    }
}

// =============================================================================
// Scenario A: sign-up
// =============================================================================

#[tokio::test]
async fn signup_returns_confirmation_id_without_cookies() {
    let app = test_app("delegated_provider");

    let reply = app
        .post(
            "/auth/signup",
            json!({"email": "new@example.com", "password": PASSWORD}),
            "",
        )
        .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["message"], "User registered");
    assert!(reply.body["confirmation_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(reply.headers.get(header::SET_COOKIE).is_none());
    assert_eq!(app.store.user_count(), 1);
}

#[tokio::test]
async fn signup_with_weak_password_is_400() {
    let app = test_app("delegated_provider");
    let reply = app
        .post(
            "/auth/signup",
            json!({"email": "new@example.com", "password": "weak"}),
            "",
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["success"], false);
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn signup_with_taken_email_is_409() {
    let app = test_app("delegated_provider");
    let reply = app
        .post(
            "/auth/signup",
            json!({"email": "a@example.com", "password": PASSWORD}),
            "",
        )
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn malformed_body_gets_the_error_envelope() {
    let app = test_app("delegated_provider");
    let reply = app.post("/auth/signup", json!({"email": 7}), "").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn signup_then_verify_provisions_default_team() {
    let app = test_app("delegated_provider");
    let signup = app
        .post(
            "/auth/signup",
            json!({"email": "new@example.com", "password": PASSWORD}),
            "",
        )
        .await;
    let confirmation_id = signup.body["confirmation_id"].as_str().unwrap().to_string();
    let code = app.provider.verification_code(&confirmation_id).unwrap();

    let reply = app
        .post(
            "/auth/verify/confirm",
            json!({"code": code, "confirmation_id": confirmation_id}),
            "",
        )
        .await;

    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["message"], "Email verified");
    assert_eq!(reply.body["user"]["email_verified"], true);
    assert_eq!(app.store.team_count(), 1);
}

#[tokio::test]
async fn verify_confirm_rejects_path_like_ids_before_calling_provider() {
    let app = test_app("delegated_provider");

    for body in [
        json!({"code": "123456", "confirmation_id": "../x#"}),
        json!({"code": "123456", "user_id": "../../organizations/org_1/delete?x="}),
    ] {
        let reply = app.post("/auth/verify/confirm", body, "").await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{}", reply.body);
        assert_eq!(reply.body["code"], "VALIDATION_FAILED");
    }

    assert!(!app
        .provider
        .calls()
        .iter()
        .any(|call| call.starts_with("verify_email:")));
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn login_sets_both_cookies_and_returns_user() {
    let app = test_app("delegated_provider");
    let (reply, _) = app.login_a().await;

    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["user"]["external_id"], "user_a");
    assert_eq!(reply.body["user"]["email"], "a@example.com");

    let access = reply.raw_cookie("access_token").unwrap();
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("SameSite=Strict"));
    assert!(!access.contains("Secure"));
    let state = reply.raw_cookie("session_state").unwrap();
    assert!(state.contains("SameSite=Lax"));
    assert!(state.contains("Max-Age=2592000"));
    assert_eq!(app.store.team_count(), 1);
}

#[tokio::test]
async fn wrong_password_is_401_and_clears_cookies() {
    let app = test_app("delegated_provider");
    let reply = app
        .post(
            "/auth/login",
            json!({"email": "a@example.com", "password": "Wr0ng!Pass"}),
            "",
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    reply.assert_session_cleared();
}

#[tokio::test]
async fn unverified_login_is_403() {
    let app = test_app("delegated_provider");
    let reply = app
        .post(
            "/auth/login",
            json!({"email": "u@example.com", "password": PASSWORD}),
            "",
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["code"], "EMAIL_VERIFICATION_REQUIRED");
}

#[tokio::test]
async fn oauth_only_deployment_rejects_password_login() {
    let app = test_app("oauth_social");
    let reply = app
        .post(
            "/auth/login",
            json!({"email": "a@example.com", "password": PASSWORD}),
            "",
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert!(app.provider.calls().is_empty());
}

// =============================================================================
// Scenario B: OAuth
// =============================================================================

#[tokio::test]
async fn oauth_callback_links_new_subject_and_redirects() {
    let app = test_app("delegated_provider");

    let reply = app.get("/auth/google/callback?code=code_b", "").await;

    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(reply.location(), format!("{}/auth/ready", APP_URL));
    let cookies = reply.cookies();
    assert!(!cookies["access_token"].is_empty());
    assert!(!cookies["session_state"].is_empty());

    let user = app
        .store
        .find_user_by_external_id("user_b")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.email.as_deref(), Some("b@example.com"));
    let teams = app.store.list_teams_for_user(user.id).await.unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0].team.name, "My team");
    assert!(app
        .store
        .find_identity("workos", "user_b")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn authorize_then_callback_follows_sealed_redirect() {
    let app = test_app("delegated_provider");

    let begin = app
        .get("/auth/github/authorize?redirect=%2Fteams%2F1", "")
        .await;
    assert_eq!(begin.status, StatusCode::FOUND);
    let location = url::Url::parse(&begin.location()).unwrap();
    let pairs: HashMap<String, String> = location.query_pairs().into_owned().collect();
    assert_eq!(pairs["provider"], "GitHubOAuth");
    assert_eq!(
        pairs["redirect_uri"],
        "https://api.example.com/auth/github/callback"
    );
    let state = pairs["state"].clone();
    let state_cookie = begin.cookies()["oauth_state"].clone();
    assert_eq!(state, state_cookie);

    let reply = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/auth/github/callback")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::COOKIE, format!("oauth_state={}", state_cookie))
                .body(Body::from(format!(
                    "code=code_b&state={}",
                    url::form_urlencoded::byte_serialize(state.as_bytes()).collect::<String>()
                )))
                .unwrap(),
        )
        .await;

    assert_eq!(reply.status, StatusCode::FOUND, "{}", reply.body);
    assert_eq!(reply.location(), format!("{}/teams/1", APP_URL));
    assert!(reply.raw_cookie("oauth_state").unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn callback_with_mismatched_state_is_400() {
    let app = test_app("delegated_provider");
    let reply = app
        .get(
            "/auth/google/callback?code=code_b&state=forged",
            "oauth_state=expected",
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn callback_errors_and_unknown_providers() {
    let app = test_app("delegated_provider");

    let denied = app
        .get("/auth/google/callback?error=access_denied", "")
        .await;
    assert_eq!(denied.status, StatusCode::BAD_REQUEST);

    let no_code = app.get("/auth/google/callback", "").await;
    assert_eq!(no_code.status, StatusCode::BAD_REQUEST);

    let unknown = app.get("/auth/okta/authorize", "").await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Scenario C and the session gate
// =============================================================================

#[tokio::test]
async fn me_without_cookies_is_401() {
    let app = test_app("delegated_provider");
    let reply = app.get("/auth/me", "").await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["success"], false);
    reply.assert_session_cleared();
}

#[tokio::test]
async fn me_with_session_returns_user() {
    let app = test_app("delegated_provider");
    let (_, cookies) = app.login_a().await;

    let reply = app.get("/auth/me", &cookies).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["user"]["external_id"], "user_a");
    assert!(reply.headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn forged_access_token_is_401_and_clears_cookies() {
    let app = test_app("delegated_provider");
    app.login_a().await;

    let reply = app.get("/auth/me", "access_token=forged").await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    reply.assert_session_cleared();
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_proceeds() {
    let app = test_app("delegated_provider");
    let (login, cookies) = app.login_a().await;
    let old_token = login.cookies()["access_token"].clone();

    app.tokens.add_expired(
        old_token.clone(),
        MockTokenVerifier::claims("user_a", "session_1", Timestamp::now().as_unix_secs() - 10),
    );

    let reply = app.get("/auth/me", &cookies).await;

    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    let reissued = reply.cookies();
    assert_ne!(reissued["access_token"], old_token);
    assert!(!reissued["session_state"].is_empty());

    let identity = app
        .store
        .find_identity("workos", "user_a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.access_token.as_deref(), Some(reissued["access_token"].as_str()));
}

#[tokio::test]
async fn expired_token_with_dead_session_is_401() {
    let app = test_app("delegated_provider");
    let (login, cookies) = app.login_a().await;
    let old_token = login.cookies()["access_token"].clone();
    app.tokens.add_expired(
        old_token,
        MockTokenVerifier::claims("user_a", "session_x", Timestamp::now().as_unix_secs() - 10),
    );
    app.provider.fail(
        "authenticate_with_refresh_token",
        ProviderError::InvalidCredentials,
    );

    let reply = app.get("/auth/me", &cookies).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["code"], "SESSION_EXPIRED");
    reply.assert_session_cleared();
}

// =============================================================================
// Explicit refresh
// =============================================================================

#[tokio::test]
async fn refresh_rotates_session_cookies() {
    let app = test_app("delegated_provider");
    let (login, cookies) = app.login_a().await;

    let reply = app.post("/auth/refresh", json!({}), &cookies).await;

    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["user"]["external_id"], "user_a");
    assert_ne!(reply.cookies()["access_token"], login.cookies()["access_token"]);
}

#[tokio::test]
async fn refresh_without_bundle_is_401() {
    let app = test_app("delegated_provider");
    let reply = app
        .post("/auth/refresh", json!({}), "session_state=tampered")
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    reply.assert_session_cleared();
}

// =============================================================================
// Scenario D: logout
// =============================================================================

#[tokio::test]
async fn logout_clears_cookies_even_when_revoke_fails() {
    let app = test_app("delegated_provider");
    let (_, cookies) = app.login_a().await;
    app.provider.fail(
        "revoke_session",
        ProviderError::Unavailable("connection reset".to_string()),
    );

    let reply = app.post("/auth/logout", json!({}), &cookies).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "Logged out");
    reply.assert_session_cleared();
    assert!(app
        .provider
        .calls()
        .iter()
        .any(|call| call.starts_with("revoke_session:")));
}

#[tokio::test]
async fn logout_without_session_still_succeeds() {
    let app = test_app("delegated_provider");
    let reply = app.post("/auth/logout", json!({}), "").await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.assert_session_cleared();
}

// =============================================================================
// Password reset, resend and email change
// =============================================================================

#[tokio::test]
async fn password_reset_round_trip() {
    let app = test_app("delegated_provider");

    let reply = app
        .post("/auth/password/reset", json!({"email": "a@example.com"}), "")
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(app
        .provider
        .calls()
        .iter()
        .any(|call| call.ends_with(&format!("{}/auth/password/confirm", APP_URL))));

    let token = app.provider.reset_token_for("user_a").unwrap();
    let reply = app
        .post(
            "/auth/password/confirm",
            json!({"token": token, "password": "N3w!Password"}),
            "",
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let login = app
        .post(
            "/auth/login",
            json!({"email": "a@example.com", "password": "N3w!Password"}),
            "",
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn resend_email_reports_confirmation_id() {
    let app = test_app("delegated_provider");
    let reply = app
        .post("/auth/resend-email", json!({"email": "u@example.com"}), "")
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["confirmation_id"], "user_u");

    let missing = app
        .post("/auth/resend-email", json!({"email": "nobody@example.com"}), "")
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn change_email_requires_session_and_keeps_link() {
    let app = test_app("delegated_provider");

    let anonymous = app
        .post("/auth/email", json!({"email": "z@example.com"}), "")
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let (_, cookies) = app.login_a().await;
    let reply = app
        .post("/auth/email", json!({"email": "z@example.com"}), &cookies)
        .await;

    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["user"]["email"], "z@example.com");
    assert_eq!(reply.body["user"]["email_verified"], false);
    let link = app
        .store
        .find_identity("workos", "user_a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.provider_email.as_deref(), Some("z@example.com"));
}

#[tokio::test]
async fn verify_send_requires_session() {
    let app = test_app("delegated_provider");
    assert_eq!(
        app.post("/auth/verify/send", json!({}), "").await.status,
        StatusCode::UNAUTHORIZED
    );

    let (_, cookies) = app.login_a().await;
    let reply = app.post("/auth/verify/send", json!({}), &cookies).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(app.provider.verification_code("user_a").is_some());
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app("delegated_provider");
    let reply = app.get("/health", "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({"success": true, "status": "ok"}));
}

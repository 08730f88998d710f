//! Integration tests for JWKS-backed token verification.
//!
//! A local axum server publishes the fixture key set; the real verifier
//! fetches it over HTTP and guards the full router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower::ServiceExt;

use blueprint_auth::adapters::auth::{JwksConfig, JwksTokenVerifier, MockIdentityProvider};
use blueprint_auth::adapters::http::{build_router, AppDependencies};
use blueprint_auth::adapters::memory::InMemoryIdentityStore;
use blueprint_auth::application::IdentityReconciler;
use blueprint_auth::config::AppConfig;
use blueprint_auth::domain::foundation::Timestamp;
use blueprint_auth::domain::session::TokenError;
use blueprint_auth::ports::TokenVerifier;

const JWKS: &str = include_str!("fixtures/jwks.json");
const KEY_1: &[u8] = include_bytes!("fixtures/rsa_key_1.pem");
const KEY_2: &[u8] = include_bytes!("fixtures/rsa_key_2.pem");
const CLIENT_ID: &str = "client_123";

// =============================================================================
// Test Infrastructure
// =============================================================================

/// Serves the fixture key set and counts fetches.
async fn serve_jwks() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/jwks",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ([(header::CONTENT_TYPE, "application/json")], JWKS)
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/jwks", addr), hits)
}

fn verifier(url: &str) -> JwksTokenVerifier {
    JwksTokenVerifier::new(
        JwksConfig::new(url, CLIENT_ID, vec!["api.workos.com".to_string()])
            .with_http_timeout(Duration::from_secs(2)),
    )
    .unwrap()
}

fn sign(pem: &[u8], kid: &str, subject: &str) -> String {
    let now = Timestamp::now().as_unix_secs();
    let claims = json!({
        "iss": "https://api.workos.com/",
        "sub": subject,
        "sid": "session_01",
        "aud": CLIENT_ID,
        "email": "a@example.com",
        "email_verified": true,
        "iat": now - 5,
        "exp": now + 300
    });
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, &claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

fn config() -> AppConfig {
    serde_json::from_value(json!({
        "database": { "url": "postgresql://unused@localhost/test" },
        "auth": { "client_id": CLIENT_ID, "api_key": "sk_test" },
        "session": { "cookie_secret": "integration-test-cookie-secret" }
    }))
    .unwrap()
}

/// Router guarded by the real verifier, with `user_a` linked locally.
async fn app(url: &str) -> Router {
    let provider = Arc::new(MockIdentityProvider::new().with_user(
        MockIdentityProvider::remote_user("user_a", "a@example.com", true),
        None,
    ));
    let store = InMemoryIdentityStore::new();
    IdentityReconciler::new(Arc::new(store.clone()), provider.clone())
        .ensure_local_user(&provider.user("user_a").unwrap(), None)
        .await
        .unwrap();

    build_router(
        &config(),
        AppDependencies {
            provider,
            verifier: Arc::new(verifier(url)),
            store: Arc::new(store),
        },
    )
}

async fn me(router: &Router, token: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .header(header::COOKIE, format!("access_token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

// =============================================================================
// Verifier against a live key endpoint
// =============================================================================

#[tokio::test]
async fn keys_are_fetched_lazily_and_cached() {
    let (url, hits) = serve_jwks().await;
    let verifier = verifier(&url);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let token = sign(KEY_1, "key-1", "user_a");
    let claims = verifier.verify(&token).await.unwrap();
    assert_eq!(claims.subject, "user_a");
    assert_eq!(claims.session_id.as_deref(), Some("session_01"));

    verifier.verify(&token).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(verifier.key_cache().key_count().await, 1);
}

#[tokio::test]
async fn unknown_kid_refetches_once_then_fails() {
    let (url, hits) = serve_jwks().await;
    let verifier = verifier(&url);
    verifier.key_cache().refresh(true).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let err = verifier
        .verify(&sign(KEY_2, "key-2", "user_a"))
        .await
        .unwrap_err();

    assert_eq!(err, TokenError::UnknownKey);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn expired_cache_is_refetched_on_next_lookup() {
    let (url, hits) = serve_jwks().await;
    let verifier = JwksTokenVerifier::new(
        JwksConfig::new(&url, CLIENT_ID, vec!["api.workos.com".to_string()])
            .with_cache_ttl(Duration::from_millis(200))
            .with_http_timeout(Duration::from_secs(2)),
    )
    .unwrap();
    let token = sign(KEY_1, "key-1", "user_a");

    verifier.verify(&token).await.unwrap();
    verifier.verify(&token).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;

    verifier.verify(&token).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_lookups_share_one_fetch() {
    let (url, hits) = serve_jwks().await;
    let verifier = Arc::new(verifier(&url));
    let token = sign(KEY_1, "key-1", "user_a");

    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let verifier = verifier.clone();
        let token = token.clone();
        tasks.spawn(async move { verifier.verify(&token).await });
    }
    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap().subject, "user_a");
    }

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wrong_key_under_known_kid_is_rejected() {
    let (url, _) = serve_jwks().await;
    let err = verifier(&url)
        .verify(&sign(KEY_2, "key-1", "user_a"))
        .await
        .unwrap_err();
    assert_eq!(err, TokenError::InvalidSignature);
}

#[tokio::test]
async fn unreachable_endpoint_fails_verification() {
    let err = verifier("http://127.0.0.1:9/jwks")
        .verify(&sign(KEY_1, "key-1", "user_a"))
        .await
        .unwrap_err();
    assert_eq!(err, TokenError::KeysUnavailable);
}

// =============================================================================
// Router guarded by the verifier
// =============================================================================

#[tokio::test]
async fn signed_token_for_linked_subject_reaches_handler() {
    let (url, _) = serve_jwks().await;
    let router = app(&url).await;

    let (status, body) = me(&router, &sign(KEY_1, "key-1", "user_a")).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["user"]["external_id"], "user_a");
}

#[tokio::test]
async fn token_signed_by_unpublished_key_is_401() {
    let (url, _) = serve_jwks().await;
    let router = app(&url).await;

    let (status, body) = me(&router, &sign(KEY_2, "key-2", "user_a")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn valid_token_for_unlinked_subject_is_401() {
    let (url, _) = serve_jwks().await;
    let router = app(&url).await;

    let (status, _) = me(&router, &sign(KEY_1, "key-1", "user_stranger")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

//! blueprint-auth server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blueprint_auth::adapters::auth::{JwksConfig, JwksTokenVerifier, WorkosClient, WorkosConfig};
use blueprint_auth::adapters::http::{build_router, AppDependencies};
use blueprint_auth::adapters::postgres::PostgresIdentityStore;
use blueprint_auth::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    init_tracing(&config);

    // ========================================================================
    // DATABASE
    // ========================================================================

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        info!("Database migrations applied");
    }

    // ========================================================================
    // IDENTITY PROVIDER AND TOKEN VERIFICATION
    // ========================================================================

    let provider = WorkosClient::new(WorkosConfig {
        api_base_url: config.auth.api_base_url.clone(),
        client_id: config.auth.client_id.clone(),
        api_key: config.auth.api_key.clone(),
        timeout: config.auth.http_timeout(),
    })
    .context("Failed to build identity provider client")?;

    let verifier = JwksTokenVerifier::new(
        JwksConfig::new(
            config.auth.jwks_url(),
            config.auth.client_id.clone(),
            config.auth.issuer_hosts(),
        )
        .with_cache_ttl(config.auth.jwks_cache_ttl())
        .with_http_timeout(config.auth.http_timeout()),
    )
    .context("Failed to build token verifier")?;

    // ========================================================================
    // ROUTER
    // ========================================================================

    let app = build_router(
        &config,
        AppDependencies {
            provider: Arc::new(provider),
            verifier: Arc::new(verifier),
            store: Arc::new(PostgresIdentityStore::new(pool)),
        },
    );

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, environment = ?config.server.environment, "blueprint-auth listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// JSON logs in production, human-readable otherwise.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.is_production() {
        builder.json().with_current_span(false).init();
    } else {
        builder.with_target(false).init();
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

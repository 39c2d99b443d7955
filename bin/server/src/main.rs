use gatehouse_platform_access::{ProviderRegistry, SessionIssuer};
use gatehouse_server::{
    app,
    auth::{AppState, HttpProviderClient, KeySetCache, PgUserStore, SessionCookies, TokenVerifier},
    config::ServerConfig,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    let addr = config.listen_addr().expect("invalid listen address");
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let registry = Arc::new(
        ProviderRegistry::from_config(&config.providers).expect("invalid provider configuration"),
    );
    if registry.is_empty() {
        tracing::warn!("no identity providers configured; every login will fail");
    }
    for provider in registry.providers() {
        tracing::info!(%provider, "identity provider enabled");
    }

    let client = Arc::new(
        HttpProviderClient::new(config.http.timeout()).expect("failed to build HTTP client"),
    );
    let verifier = TokenVerifier::new(
        KeySetCache::new(client.clone(), config.http.jwks_ttl()),
        Arc::clone(&registry),
    );
    let sessions = SessionCookies::new(
        SessionIssuer::new(&config.session.secret, config.session.ttl_seconds)
            .expect("invalid session configuration"),
        config.session.secure_cookies,
    );

    let app_state = Arc::new(AppState {
        registry,
        client,
        verifier,
        store: Arc::new(PgUserStore::new(db_pool)),
        sessions,
        frontend_origin: config.frontend_origin,
        public_base_url: config.public_base_url,
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app::router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

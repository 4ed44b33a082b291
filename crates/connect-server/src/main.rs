//! creator-connect HTTP Server
//!
//! Axum-based server wiring the onboarding, checkout, webhook and
//! access-grant services behind a REST API.

mod auth;
mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use connect_core::{
    AccessGrantTrigger, CheckoutOrchestrator, ConnectProvider, CreatorStore, JsonFileCreatorStore,
    MatrixConfig, MatrixInviter, MemoryCreatorStore, OnboardingService, WebhookDispatcher,
    WebhookVerifier,
};

use crate::auth::AdminCredentials;
use crate::config::ServerConfig;
use crate::handlers::{
    connect_refresh, connect_return, create_checkout, generate_login_link, get_creator,
    health_check, list_creators, onboard_creator, root, stripe_connect_webhook,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;

    // Payment provider
    let provider: Arc<dyn ConnectProvider> =
        Arc::new(connect_core::StripeConnectClient::from_env()?);
    tracing::info!("✓ Stripe Connect configured");

    // Creator store
    let store: Arc<dyn CreatorStore> = match &config.creators_db_path {
        Some(path) => {
            tracing::info!(%path, "using file-backed creator store");
            Arc::new(JsonFileCreatorStore::open(path)?)
        }
        None => {
            tracing::warn!("⚠ CREATORS_DB_PATH not set - creator records are in-memory only");
            Arc::new(MemoryCreatorStore::new())
        }
    };

    // Space inviter: the bot session lives for the whole process
    let inviter = Arc::new(MatrixInviter::login(MatrixConfig::from_env()?).await?);
    tracing::info!("✓ Matrix bot session established");

    // Services
    let onboarding = Arc::new(OnboardingService::new(
        store.clone(),
        provider.clone(),
        config.base_url.clone(),
    ));
    let checkout = Arc::new(CheckoutOrchestrator::new(
        store.clone(),
        provider.clone(),
        config.base_url.clone(),
    ));
    let grants = Arc::new(AccessGrantTrigger::new(provider.clone(), inviter.clone()));
    let webhooks = Arc::new(WebhookDispatcher::new(
        WebhookVerifier::new(config.webhook_secret.clone()),
        onboarding.clone(),
        grants,
    ));

    let state = AppState {
        onboarding,
        checkout,
        webhooks,
        auth: AdminCredentials::new(config.admin_username.clone(), config.admin_password.clone()),
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        // Health & info
        .route("/", get(root))
        .route("/health", get(health_check))
        // Onboarding
        .route("/connect/onboard", post(onboard_creator))
        .route("/connect/return", get(connect_return))
        .route("/connect/refresh", get(connect_refresh))
        // Webhooks
        .route("/webhook/stripe/connect", post(stripe_connect_webhook))
        // Checkout
        .route("/connect/create-checkout", post(create_checkout))
        // Creators
        .route("/creators", get(list_creators))
        .route("/creators/{creator_id}", get(get_creator))
        .route(
            "/creators/{creator_id}/generate-login-link",
            post(generate_login_link),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 creator-connect running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                  - Health check");
    tracing::info!("  POST /connect/onboard         - Provision creator (admin)");
    tracing::info!("  GET  /connect/return          - Onboarding return landing");
    tracing::info!("  GET  /connect/refresh         - Refresh onboarding link");
    tracing::info!("  POST /webhook/stripe/connect  - Connect webhooks");
    tracing::info!("  POST /connect/create-checkout - Split-fee checkout");
    tracing::info!("  GET  /creators                - List creators");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Release the bot session on the way out
    if let Err(e) = inviter.logout().await {
        tracing::warn!(error = %e, "matrix logout failed");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

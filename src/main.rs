//! PayU Reconciliation Service - Main Application Entry Point
//!
//! This is a REST API server that starts PayU payments, receives the
//! gateway's callbacks and keeps one authoritative status per transaction.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Gateway**: PayU over reqwest, SHA-512 request and response hashes
//! - **Format**: JSON requests/responses, form-encoded gateway callbacks
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Wire stores, gateway client and services
//! 5. Build HTTP router and start server on configured port

use std::sync::Arc;

use payu_reconciler::{
    app::{AppState, build_router},
    config, db,
    services::{
        callback_processor::CallbackProcessor, gateway_client::PayuClient,
        payment_intent::PaymentIntentService, verification::VerificationClient,
    },
    store::{
        CustomerStore, TransactionStore, WebhookStore,
        postgres::{PgCustomerStore, PgTransactionStore, PgWebhookStore},
    },
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    let gateway_config = Arc::new(config.gateway());
    if gateway_config.credentials().is_err() {
        // Startup continues; initiation and callbacks answer with configuration errors
        tracing::warn!("PayU merchant credentials are not set");
    }
    tracing::info!(mode = ?gateway_config.mode, "Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Stores
    let transactions: Arc<dyn TransactionStore> = Arc::new(PgTransactionStore::new(pool.clone()));
    let webhooks: Arc<dyn WebhookStore> = Arc::new(PgWebhookStore::new(pool.clone()));
    let customers: Option<Arc<dyn CustomerStore>> = if config.persist_customers {
        Some(Arc::new(PgCustomerStore::new(pool.clone())))
    } else {
        None
    };

    // Gateway client and services
    let gateway = Arc::new(PayuClient::new(&gateway_config)?);

    let state = AppState {
        intents: Arc::new(PaymentIntentService::new(
            gateway_config.clone(),
            transactions.clone(),
            customers,
            gateway.clone(),
        )),
        callbacks: Arc::new(CallbackProcessor::new(
            gateway_config.clone(),
            transactions.clone(),
            webhooks,
        )),
        verification: Arc::new(VerificationClient::new(
            gateway_config.clone(),
            transactions.clone(),
            gateway,
        )),
        transactions,
        reject_invalid_signatures: config.reject_invalid_signatures,
    };

    let app = build_router(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    axum::serve(listener, app).await?;

    Ok(())
}

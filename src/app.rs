//! Router construction and shared handler state.
//!
//! Kept out of `main.rs` so integration tests can drive the same router
//! with in-memory stores and a fake gateway.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::services::callback_processor::CallbackProcessor;
use crate::services::payment_intent::PaymentIntentService;
use crate::services::verification::VerificationClient;
use crate::store::TransactionStore;

/// State shared by every handler.
///
/// Cloned per request; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub intents: Arc<PaymentIntentService>,
    pub callbacks: Arc<CallbackProcessor>,
    pub verification: Arc<VerificationClient>,
    pub transactions: Arc<dyn TransactionStore>,
    /// Answer forged callbacks with 400 instead of the generic failure page
    pub reject_invalid_signatures: bool,
}

/// Build the HTTP router.
///
/// # Routes
///
/// - `GET  /health`
/// - `POST /api/payu/payment-intent`
/// - `GET  /api/payu/payment-redirect`
/// - `POST /api/payu/success`, `POST /api/payu/failure`
/// - `POST /api/payu/webhook`
/// - `POST /api/payu/verify-payment`
/// - `GET  /api/payu/payment-status/{txnid}`
/// - `GET  /api/payu/transaction/{txnid}`
pub fn build_router(state: AppState) -> Router {
    let payu_routes = Router::new()
        // Initiation
        .route(
            "/payment-intent",
            post(handlers::payments::create_payment_intent),
        )
        .route(
            "/payment-redirect",
            get(handlers::payments::payment_redirect),
        )
        // Gateway callbacks
        .route("/success", post(handlers::callbacks::payment_success))
        .route("/failure", post(handlers::callbacks::payment_failure))
        .route("/webhook", post(handlers::callbacks::webhook))
        // Verification and lookup
        .route("/verify-payment", post(handlers::payments::verify_payment))
        .route(
            "/payment-status/{txnid}",
            get(handlers::payments::payment_status),
        )
        .route(
            "/transaction/{txnid}",
            get(handlers::payments::get_transaction),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/payu", payu_routes)
        // Browser front-ends call the JSON endpoints cross-origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Liveness and store readiness for load balancers.

use crate::{app::AppState, error::AppError};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,

    /// `connected` once the transaction store answered its ping
    pub database: String,

    pub timestamp: DateTime<Utc>,
}

/// `GET /health`
///
/// Pings the configured [`crate::store::TransactionStore`] (a `SELECT 1` on
/// Postgres, a no-op in memory). Callbacks cannot be reconciled without it,
/// so a failed ping surfaces as the usual `internal_error` body with 500.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    state.transactions.ping().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        database: "connected".to_string(),
        timestamp: Utc::now(),
    }))
}

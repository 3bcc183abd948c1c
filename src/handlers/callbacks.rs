//! Gateway callback handlers.
//!
//! PayU posts form-encoded bodies to these endpoints:
//! - POST /api/payu/success - Browser return after a successful payment
//! - POST /api/payu/failure - Browser return after a failed payment
//! - POST /api/payu/webhook - Server-to-server notification
//!
//! The browser returns always end in a 303 to the merchant front-end, except
//! forged callbacks when `REJECT_INVALID_SIGNATURES` is on (400).

use axum::{
    Form, Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;

use crate::{
    app::AppState,
    error::AppError,
    models::callback::{CallbackEvent, RawPayload},
    services::callback_processor::Disposition,
};

/// Acknowledgement returned to webhook calls.
///
/// # JSON Example
///
/// ```json
/// {
///   "received": true,
///   "verified": true,
///   "referenceId": "TXN1734771234567a1b2c3d4",
///   "disposition": "transitioned"
/// }
/// ```
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub verified: bool,
    pub reference_id: Option<String>,
    pub disposition: Option<Disposition>,
}

/// Browser return from a successful payment.
pub async fn payment_success(
    State(state): State<AppState>,
    Form(raw): Form<RawPayload>,
) -> Result<Response, AppError> {
    redirect_after(&state, CallbackEvent::Success, raw).await
}

/// Browser return from a failed or cancelled payment.
pub async fn payment_failure(
    State(state): State<AppState>,
    Form(raw): Form<RawPayload>,
) -> Result<Response, AppError> {
    redirect_after(&state, CallbackEvent::Failure, raw).await
}

/// Server-to-server notification.
///
/// # Response (200)
///
/// A [`WebhookAck`]. PayU retries on anything other than 2xx, so forged
/// payloads are acknowledged with `"verified": false` unless rejection is enabled.
pub async fn webhook(
    State(state): State<AppState>,
    Form(raw): Form<RawPayload>,
) -> Result<Json<WebhookAck>, AppError> {
    match state.callbacks.handle_callback(CallbackEvent::Webhook, &raw).await {
        Ok(outcome) => Ok(Json(WebhookAck {
            received: true,
            verified: true,
            reference_id: outcome.reference_id,
            disposition: Some(outcome.disposition),
        })),
        Err(AppError::InvalidSignature) if !state.reject_invalid_signatures => Ok(Json(WebhookAck {
            received: true,
            verified: false,
            reference_id: None,
            disposition: None,
        })),
        Err(e) => Err(e),
    }
}

async fn redirect_after(
    state: &AppState,
    event: CallbackEvent,
    raw: RawPayload,
) -> Result<Response, AppError> {
    match state.callbacks.handle_callback(event, &raw).await {
        Ok(outcome) => Ok(Redirect::to(&outcome.redirect_url).into_response()),
        Err(AppError::InvalidSignature) if !state.reject_invalid_signatures => {
            Ok(Redirect::to(&state.callbacks.failure_page()).into_response())
        }
        Err(e) => Err(e),
    }
}

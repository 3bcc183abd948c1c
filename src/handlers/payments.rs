//! Payment HTTP handlers.
//!
//! This module implements the merchant-facing payment endpoints:
//! - POST /api/payu/payment-intent - Start a payment
//! - GET /api/payu/payment-redirect - QR landing link, sends the user to PayU
//! - POST /api/payu/verify-payment - Ask PayU and settle the stored transaction
//! - GET /api/payu/payment-status/{txnid} - Ask PayU without touching the store
//! - GET /api/payu/transaction/{txnid} - Stored transaction

use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use rust_decimal::Decimal;

use crate::{
    app::AppState,
    error::AppError,
    models::{
        gateway::{GatewayInitiation, IntentResult, StatusResult},
        transaction::{
            CreatePaymentRequest, PaymentRedirectQuery, TransactionResponse, VerifyPaymentRequest,
        },
    },
};

/// Placeholder identity used by the QR landing link when the query omits it.
const DEFAULT_CUSTOMER_NAME: &str = "Customer";
const DEFAULT_CUSTOMER_EMAIL: &str = "customer@example.com";
const DEFAULT_CUSTOMER_PHONE: &str = "9999999999";

/// Start a payment.
///
/// # Request Body
///
/// ```json
/// {
///   "customerName": "Jane",
///   "customerEmail": "jane@example.com",
///   "customerPhone": "9999999999",
///   "amount": 100.00
/// }
/// ```
///
/// # Response (200)
///
/// ```json
/// {
///   "referenceId": "TXN1734771234567a1b2c3d4",
///   "amount": "100.00",
///   "gateway": { "type": "redirect", "url": "https://test.payu.in/..." }
/// }
/// ```
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<IntentResult>, AppError> {
    let result = state.intents.create_from_request(&request).await?;
    Ok(Json(result))
}

/// QR landing link.
///
/// Creates an intent from the query string and sends the browser on to the
/// gateway: a 303 to the hosted page, or an auto-submitting form when the
/// gateway expects the browser to post the checkout fields itself.
pub async fn payment_redirect(
    State(state): State<AppState>,
    Query(query): Query<PaymentRedirectQuery>,
) -> Result<Response, AppError> {
    let amount = Decimal::from_str(query.amount.trim())
        .map_err(|_| AppError::InvalidRequest(format!("Invalid amount '{}'", query.amount)))?;

    let result = state
        .intents
        .create_intent(
            or_default(query.customer_name.as_deref(), DEFAULT_CUSTOMER_NAME),
            or_default(query.customer_email.as_deref(), DEFAULT_CUSTOMER_EMAIL),
            or_default(query.customer_phone.as_deref(), DEFAULT_CUSTOMER_PHONE),
            amount,
        )
        .await?;

    let response = match result.gateway.clone() {
        GatewayInitiation::Redirect { url } => Redirect::to(&url).into_response(),
        GatewayInitiation::Form { action, fields } => {
            Html(auto_submit_form(&action, &fields)).into_response()
        }
        GatewayInitiation::Qr { .. } => Json(result).into_response(),
    };

    Ok(response)
}

/// Verify a payment with the gateway and reconcile the stored transaction.
///
/// # Request Body
///
/// ```json
/// { "txnid": "TXN1734771234567a1b2c3d4" }
/// ```
///
/// # Response (200)
///
/// A gateway that cannot be reached, or that answers without an entry for
/// this payment, yields `"status": "error"`, not an HTTP error.
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<StatusResult>, AppError> {
    let result = state.verification.verify(&request.txnid).await?;
    Ok(Json(result))
}

/// Current gateway status, read-only.
pub async fn payment_status(
    State(state): State<AppState>,
    Path(txnid): Path<String>,
) -> Result<Json<StatusResult>, AppError> {
    let result = state.verification.get_status(&txnid).await?;
    Ok(Json(result))
}

/// Stored transaction by reference id.
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(txnid): Path<String>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = state
        .transactions
        .find_by_reference(&txnid)
        .await?
        .ok_or(AppError::TransactionNotFound(txnid))?;

    Ok(Json(transaction.into()))
}

fn or_default<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(default)
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn auto_submit_form<'a>(
    action: &str,
    fields: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> String {
    let inputs: String = fields
        .into_iter()
        .map(|(name, value)| {
            format!(
                r#"<input type="hidden" name="{}" value="{}">"#,
                escape_html(name),
                escape_html(value)
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html><html><body onload="document.forms[0].submit()"><form method="post" action="{}">{}<noscript><button type="submit">Continue to payment</button></noscript></form></body></html>"#,
        escape_html(action),
        inputs
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_auto_submit_form_escapes_values() {
        let mut fields = BTreeMap::new();
        fields.insert("productinfo".to_string(), r#"Tea & "cakes""#.to_string());

        let html = auto_submit_form("https://test.payu.in/_payment", &fields);

        assert!(html.contains(r#"action="https://test.payu.in/_payment""#));
        assert!(html.contains(r#"value="Tea &amp; &quot;cakes&quot;""#));
    }

    #[test]
    fn test_blank_identity_falls_back_to_placeholder() {
        assert_eq!(or_default(Some("  "), DEFAULT_CUSTOMER_NAME), "Customer");
        assert_eq!(or_default(None, DEFAULT_CUSTOMER_EMAIL), "customer@example.com");
        assert_eq!(or_default(Some(" Jane "), DEFAULT_CUSTOMER_NAME), "Jane");
    }
}

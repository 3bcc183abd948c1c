//! Transaction data models and API request/response types.
//!
//! This module defines:
//! - `TransactionStatus`: the internal status vocabulary
//! - `Transaction`: one payment attempt, keyed by its reference id
//! - `TransactionRow`: the `transactions` table row, decoded into a `Transaction`
//! - Request and response bodies for the payment endpoints

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Internal payment status.
///
/// `Pending` is the only non-terminal persisted state. `Error` never reaches
/// the store: it marks a verification attempt whose outcome is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Error,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Error => "error",
        }
    }

    /// `success` and `failed` are final; no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            "error" => Ok(TransactionStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A single payment attempt.
///
/// `reference_id` and `amount` never change after creation. `status`
/// moves from `Pending` to a terminal state at most once, and only through
/// [`crate::store::TransactionStore::update_if_status`].
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: Uuid,

    /// Merchant-generated id sent to PayU as `txnid`
    pub reference_id: String,

    pub amount: Decimal,

    pub status: TransactionStatus,

    /// PayU `mihpayid`, set on the terminal transition
    pub gateway_payment_id: Option<String>,

    /// Form fields of the callback that caused the terminal transition
    pub raw_callback_payload: Option<serde_json::Value>,

    pub customer_id: Option<Uuid>,

    /// Set when a divergent callback or verification result was seen
    pub review_note: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A fresh `pending` transaction.
    pub fn pending(reference_id: String, amount: Decimal, customer_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference_id,
            amount,
            status: TransactionStatus::Pending,
            gateway_payment_id: None,
            raw_callback_payload: None,
            customer_id,
            review_note: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Row of the `transactions` table.
///
/// `status` is stored as text and parsed on the way out.
#[derive(Debug, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub reference_id: String,
    pub amount: Decimal,
    pub status: String,
    pub gateway_payment_id: Option<String>,
    pub raw_callback_payload: Option<serde_json::Value>,
    pub customer_id: Option<Uuid>,
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = sqlx::Error;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TransactionStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Self {
            id: row.id,
            reference_id: row.reference_id,
            amount: row.amount,
            status,
            gateway_payment_id: row.gateway_payment_id,
            raw_callback_payload: row.raw_callback_payload,
            customer_id: row.customer_id,
            review_note: row.review_note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fields written by a terminal transition.
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    pub status: TransactionStatus,
    pub gateway_payment_id: Option<String>,
    pub raw_callback_payload: Option<serde_json::Value>,
}

/// Request to start a payment.
///
/// # JSON Example
///
/// ```json
/// {
///   "customerName": "Jane",
///   "customerEmail": "jane@example.com",
///   "customerPhone": "9999999999",
///   "amount": 100.00
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub customer_name: String,

    pub customer_email: String,

    #[serde(default)]
    pub customer_phone: String,

    /// Accepts a JSON number or a decimal string
    pub amount: Decimal,
}

/// Query string of the QR landing link (`GET /api/payu/payment-redirect`).
///
/// Every field is optional; blanks fall back to placeholder identity values.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRedirectQuery {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub amount: String,
}

/// Request body of `POST /api/payu/verify-payment`.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub txnid: String,
}

/// Response returned for a stored transaction.
///
/// The raw callback payload is internal and not exposed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub reference_id: String,
    pub amount: String,
    pub status: TransactionStatus,
    pub gateway_payment_id: Option<String>,
    pub needs_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        Self {
            reference_id: transaction.reference_id,
            amount: format!("{:.2}", transaction.amount),
            status: transaction.status,
            gateway_payment_id: transaction.gateway_payment_id,
            needs_review: transaction.review_note.is_some(),
            created_at: transaction.created_at,
            updated_at: transaction.updated_at,
        }
    }
}

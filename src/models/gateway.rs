//! Gateway-facing request and response types.
//!
//! This module defines:
//! - `InitiationPayload`: the signed checkout form sent to PayU
//! - `GatewayInitiation`: what the gateway handed back for the end user
//! - `IntentResult`: initiation result returned to API clients
//! - `StatusQuery` / `StatusResult`: signed reporting API query and its normalized answer
//! - `GatewayStatus`: PayU status vocabulary mapped onto ours

use std::collections::BTreeMap;

use serde::Serialize;

use super::transaction::TransactionStatus;

/// Signed PayU checkout form.
///
/// Field names are PayU's; the struct is posted form-encoded as-is.
#[derive(Debug, Clone, Serialize)]
pub struct InitiationPayload {
    pub key: String,
    pub txnid: String,
    pub amount: String,
    pub productinfo: String,
    pub firstname: String,
    pub email: String,
    pub phone: String,
    pub surl: String,
    pub furl: String,
    pub currency: String,
    pub udf1: String,
    pub udf2: String,
    pub udf3: String,
    pub udf4: String,
    pub udf5: String,
    pub hash: String,
}

impl InitiationPayload {
    /// Form fields as a map, for clients that post the checkout form themselves.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        [
            ("key", &self.key),
            ("txnid", &self.txnid),
            ("amount", &self.amount),
            ("productinfo", &self.productinfo),
            ("firstname", &self.firstname),
            ("email", &self.email),
            ("phone", &self.phone),
            ("surl", &self.surl),
            ("furl", &self.furl),
            ("currency", &self.currency),
            ("udf1", &self.udf1),
            ("udf2", &self.udf2),
            ("udf3", &self.udf3),
            ("udf4", &self.udf4),
            ("udf5", &self.udf5),
            ("hash", &self.hash),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }
}

/// What the gateway produced for the end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayInitiation {
    /// Send the user to this hosted payment page
    Redirect { url: String },

    /// Post these fields to `action` from the user's browser
    Form {
        action: String,
        fields: BTreeMap<String, String>,
    },

    /// Encode this payload as a QR code
    Qr { payload: String },
}

/// Result of a payment initiation.
///
/// # JSON Example
///
/// ```json
/// {
///   "referenceId": "TXN1734771234567a1b2c3d4",
///   "amount": "100.00",
///   "gateway": { "type": "redirect", "url": "https://test.payu.in/..." }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    pub reference_id: String,
    pub amount: String,
    pub gateway: GatewayInitiation,
}

/// Signed reporting API query (`postservice.php?form=2`).
#[derive(Debug, Clone, Serialize)]
pub struct StatusQuery {
    pub key: String,
    pub command: String,
    pub var1: String,
    pub hash: String,
}

/// PayU status vocabulary, folded onto ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
    NotFound,
}

impl GatewayStatus {
    /// Map a PayU `status`/`unmappedstatus` value. Unknown values count as pending.
    pub fn from_gateway(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" | "captured" => GatewayStatus::Success,
            "failure" | "failed" | "dropped" | "bounced" | "usercancelled" | "cancelled" => {
                GatewayStatus::Failed
            }
            "not found" | "not_found" => GatewayStatus::NotFound,
            _ => GatewayStatus::Pending,
        }
    }

    /// Terminal transaction status this gateway status settles to, if any.
    pub fn terminal_status(&self) -> Option<TransactionStatus> {
        match self {
            GatewayStatus::Success => Some(TransactionStatus::Success),
            GatewayStatus::Failed => Some(TransactionStatus::Failed),
            GatewayStatus::Pending | GatewayStatus::NotFound => None,
        }
    }
}

/// Normalized answer to a verification or status query.
///
/// `status == Error` means the gateway could not be asked; callers should
/// retry later rather than treat the payment as failed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    pub reference_id: String,
    pub status: TransactionStatus,
    pub gateway_payment_id: Option<String>,
    pub amount: Option<String>,
    pub message: Option<String>,
    /// True when this query moved the stored transaction to a terminal state
    pub reconciled: bool,
}

impl StatusResult {
    /// Non-throwing result for a transport failure or timeout.
    pub fn error(reference_id: &str, message: impl Into<String>) -> Self {
        Self {
            reference_id: reference_id.to_string(),
            status: TransactionStatus::Error,
            gateway_payment_id: None,
            amount: None,
            message: Some(message.into()),
            reconciled: false,
        }
    }
}

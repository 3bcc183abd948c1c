//! Webhook audit records.
//!
//! One [`WebhookRecord`] is written for every inbound callback, duplicates and
//! forged ones included. Records are never updated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::callback::{GatewayCallback, RawPayload};

/// Immutable audit entry for one inbound callback.
///
/// # Database Table
///
/// Maps to the `webhook_records` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookRecord {
    pub id: Uuid,

    /// `payment_success`, `payment_failure` or `webhook`
    pub event: String,

    /// Reference id claimed by the payload; may not match any transaction
    pub reference_id: Option<String>,

    /// Whether the payload hash matched
    pub verified: bool,

    /// Form fields exactly as received
    pub raw_payload: serde_json::Value,

    /// [`super::callback::NormalizedCallback`] serialized to JSON
    pub normalized_payload: serde_json::Value,

    pub received_at: DateTime<Utc>,
}

impl WebhookRecord {
    /// Build the audit record for a parsed callback.
    pub fn new(callback: &GatewayCallback, raw: &RawPayload, verified: bool) -> Self {
        let reference_id = Some(callback.form().txnid.trim().to_string()).filter(|r| !r.is_empty());

        Self {
            id: Uuid::new_v4(),
            event: callback.event().as_str().to_string(),
            reference_id,
            verified,
            raw_payload: serde_json::to_value(raw).unwrap_or_default(),
            normalized_payload: serde_json::to_value(callback.normalize()).unwrap_or_default(),
            received_at: Utc::now(),
        }
    }
}

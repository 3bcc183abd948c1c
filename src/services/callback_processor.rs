//! Inbound callback reconciliation.
//!
//! Every callback is audited, verified, and applied to its transaction at
//! most once. The state machine per transaction is:
//!
//! ```text
//! pending --(verified success)--> success
//! pending --(verified failure)--> failed
//! ```
//!
//! Callbacks for settled transactions are audited but never change them. When
//! a later callback disagrees with the settled outcome, or a callback's amount
//! does not match the stored one, the transaction is flagged for manual review
//! instead.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::models::callback::{CallbackEvent, CallbackForm, GatewayCallback, RawPayload};
use crate::models::gateway::GatewayStatus;
use crate::models::transaction::{Transaction, TransactionStatus, TransitionUpdate};
use crate::models::webhook::WebhookRecord;
use crate::services::hash_signer::{HashSigner, format_amount};
use crate::store::{TransactionStore, WebhookStore};

/// What a callback did to its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Moved the transaction from `pending` to a terminal state
    Transitioned,
    /// Repeated the settled outcome; nothing changed
    AlreadyTerminal,
    /// Contradicted the settled outcome or the stored amount; flagged for review
    Diverged,
    /// No transaction has this reference id
    UnknownReference,
    /// Webhook reported a non-terminal status
    NotTerminal,
}

/// Result of processing one callback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackOutcome {
    pub reference_id: Option<String>,
    /// Stored status after processing, when the transaction exists
    pub status: Option<TransactionStatus>,
    pub disposition: Disposition,
    pub redirect_url: String,
}

pub struct CallbackProcessor {
    config: Arc<GatewayConfig>,
    transactions: Arc<dyn TransactionStore>,
    webhooks: Arc<dyn WebhookStore>,
}

impl CallbackProcessor {
    pub fn new(
        config: Arc<GatewayConfig>,
        transactions: Arc<dyn TransactionStore>,
        webhooks: Arc<dyn WebhookStore>,
    ) -> Self {
        Self {
            config,
            transactions,
            webhooks,
        }
    }

    /// Generic failure page, without any transaction context.
    pub fn failure_page(&self) -> String {
        self.config.frontend_page("failure")
    }

    /// Process one callback posted to the `event` endpoint.
    ///
    /// # Process
    ///
    /// 1. Verify the payload hash
    /// 2. Append the audit record (always, even for forged payloads)
    /// 3. Look up the transaction; unknown ids get the generic failure page
    /// 4. Apply `pending -> success|failed` through the conditional update
    /// 5. Build the front-end redirect
    ///
    /// # Errors
    ///
    /// - `InvalidSignature`: hash mismatch (audited, nothing mutated)
    /// - `Configuration`: merchant salt missing, so nothing can be verified
    /// - `Database`: transaction lookup or update failed
    pub async fn handle_callback(
        &self,
        event: CallbackEvent,
        raw: &RawPayload,
    ) -> Result<CallbackOutcome, AppError> {
        let callback = GatewayCallback::parse(event, raw);
        let form = callback.form();
        let reference_id = form.txnid.trim().to_string();

        let verified = match HashSigner::from_config(&self.config) {
            Ok(signer) => signer.verify(form),
            Err(e) => {
                self.audit(WebhookRecord::new(&callback, raw, false)).await;
                return Err(e);
            }
        };

        self.audit(WebhookRecord::new(&callback, raw, verified)).await;

        if !verified {
            tracing::warn!(
                reference_id = %reference_id,
                event = event.as_str(),
                "callback signature mismatch"
            );
            return Err(AppError::InvalidSignature);
        }

        let transaction = if reference_id.is_empty() {
            None
        } else {
            self.transactions.find_by_reference(&reference_id).await?
        };

        let Some(transaction) = transaction else {
            tracing::warn!(reference_id = %reference_id, "callback for unknown reference id");
            return Ok(CallbackOutcome {
                reference_id: None,
                status: None,
                disposition: Disposition::UnknownReference,
                redirect_url: self.failure_page(),
            });
        };

        let (disposition, status) = self.apply(&callback, &transaction, raw).await?;

        tracing::info!(
            reference_id = %reference_id,
            event = event.as_str(),
            disposition = ?disposition,
            status = %status,
            "callback processed"
        );

        Ok(CallbackOutcome {
            reference_id: Some(reference_id),
            status: Some(status),
            disposition,
            redirect_url: self.redirect_for(&transaction, status, form)?,
        })
    }

    /// Decide and apply the transition; returns the disposition and final stored status.
    async fn apply(
        &self,
        callback: &GatewayCallback,
        transaction: &Transaction,
        raw: &RawPayload,
    ) -> Result<(Disposition, TransactionStatus), AppError> {
        let form = callback.form();
        let reference_id = transaction.reference_id.as_str();
        let signed = GatewayStatus::from_gateway(&form.status);

        let target = match callback.event() {
            CallbackEvent::Success => TransactionStatus::Success,
            CallbackEvent::Failure => TransactionStatus::Failed,
            CallbackEvent::Webhook => match signed.terminal_status() {
                Some(status) => status,
                None => return Ok((Disposition::NotTerminal, transaction.status)),
            },
        };

        // The success URL only counts when the signed status agrees with it.
        let contradicts = match callback.event() {
            CallbackEvent::Success => signed != GatewayStatus::Success,
            CallbackEvent::Failure => signed == GatewayStatus::Success,
            CallbackEvent::Webhook => false,
        };
        if contradicts {
            self.flag(
                reference_id,
                &format!(
                    "{} callback carried gateway status '{}'",
                    callback.event().as_str(),
                    form.status
                ),
            )
            .await;
            return Ok((Disposition::Diverged, transaction.status));
        }

        if !amount_matches(form, transaction.amount) {
            self.flag(
                reference_id,
                &format!(
                    "callback amount '{}' does not match stored amount {}",
                    form.amount,
                    format_amount(transaction.amount)
                ),
            )
            .await;
            return Ok((Disposition::Diverged, transaction.status));
        }

        let current = if transaction.status == TransactionStatus::Pending {
            let update = TransitionUpdate {
                status: target,
                gateway_payment_id: Some(form.mihpayid.trim().to_string())
                    .filter(|id| !id.is_empty()),
                raw_callback_payload: serde_json::to_value(raw).ok(),
            };

            if self
                .transactions
                .update_if_status(reference_id, TransactionStatus::Pending, update)
                .await?
            {
                return Ok((Disposition::Transitioned, target));
            }

            // Lost a race with another callback or a verification; see who won.
            self.transactions
                .find_by_reference(reference_id)
                .await?
                .map(|tx| tx.status)
                .unwrap_or(transaction.status)
        } else {
            transaction.status
        };

        if current == target {
            Ok((Disposition::AlreadyTerminal, current))
        } else {
            self.flag(
                reference_id,
                &format!(
                    "{} callback arrived after transaction settled as {}",
                    callback.event().as_str(),
                    current
                ),
            )
            .await;
            Ok((Disposition::Diverged, current))
        }
    }

    /// Success or failure page with the payment context in the query string.
    fn redirect_for(
        &self,
        transaction: &Transaction,
        status: TransactionStatus,
        form: &CallbackForm,
    ) -> Result<String, AppError> {
        let page = if status == TransactionStatus::Success {
            "success"
        } else {
            "failure"
        };

        let mut url = Url::parse(&self.config.frontend_page(page))
            .map_err(|e| AppError::Configuration(format!("FRONTEND_URL is invalid: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("referenceId", &transaction.reference_id)
                .append_pair("amount", &format_amount(transaction.amount))
                .append_pair("firstname", form.firstname.trim())
                .append_pair("email", form.email.trim())
                .append_pair("phone", form.phone.trim());

            if page == "failure" {
                query
                    .append_pair("error_code", &form.error_code().unwrap_or_default())
                    .append_pair("error_message", &form.error_text().unwrap_or_default());
            }
        }

        Ok(url.to_string())
    }

    /// Audit writes never fail the callback.
    async fn audit(&self, record: WebhookRecord) {
        if let Err(e) = self.webhooks.append(&record).await {
            tracing::error!(
                record_id = %record.id,
                reference_id = ?record.reference_id,
                error = %e,
                "failed to persist webhook record"
            );
        }
    }

    async fn flag(&self, reference_id: &str, note: &str) {
        tracing::warn!(reference_id = %reference_id, note = %note, "transaction flagged for review");
        if let Err(e) = self.transactions.flag_for_review(reference_id, note).await {
            tracing::error!(reference_id = %reference_id, error = %e, "failed to flag transaction");
        }
    }
}

fn amount_matches(form: &CallbackForm, stored: Decimal) -> bool {
    Decimal::from_str(form.amount.trim())
        .map(|amount| amount.round_dp(2) == stored.round_dp(2))
        .unwrap_or(false)
}

//! On-demand payment verification against the PayU reporting API.
//!
//! `verify` asks the gateway by reference id and settles a `pending`
//! transaction through the same conditional update the callbacks use.
//! `get_status` only reads.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::models::gateway::{GatewayStatus, StatusQuery, StatusResult};
use crate::models::transaction::{Transaction, TransactionStatus, TransitionUpdate};
use crate::services::gateway_client::GatewayClient;
use crate::services::hash_signer::{HashSigner, format_amount};
use crate::store::TransactionStore;

const VERIFY_PAYMENT: &str = "verify_payment";
const CHECK_PAYMENT: &str = "check_payment";

pub struct VerificationClient {
    config: Arc<GatewayConfig>,
    transactions: Arc<dyn TransactionStore>,
    gateway: Arc<dyn GatewayClient>,
}

/// One transaction as the reporting API describes it.
#[derive(Debug, Clone)]
struct GatewayTransaction {
    gateway_payment_id: Option<String>,
    status: GatewayStatus,
    amount: Option<String>,
    message: Option<String>,
    raw: Value,
}

enum QueryOutcome {
    Found(GatewayTransaction),
    /// The gateway could not be asked, or its answer did not settle anything
    Inconclusive(String),
}

fn text(details: &Value, key: &str) -> Option<String> {
    details
        .get(key)
        .and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
}

/// Extract the entry describing `reference_id` from a reporting API body.
///
/// `verify_payment` nests entries under `transaction_details.<txnid>`;
/// `check_payment` returns `transaction_details` flat, which is accepted only
/// when its `txnid` or `mihpayid` identifies this payment. Any other body is
/// `Err` with the gateway's `msg`.
fn parse_details(
    reference_id: &str,
    payment_id: Option<&str>,
    body: &Value,
) -> Result<GatewayTransaction, String> {
    let gateway_message =
        || text(body, "msg").unwrap_or_else(|| "Gateway returned no transaction details".to_string());

    let details = body
        .get("transaction_details")
        .filter(|d| d.is_object())
        .ok_or_else(gateway_message)?;

    let entry = match details.get(reference_id).filter(|e| e.is_object()) {
        Some(entry) => entry,
        None => {
            let same_txnid = text(details, "txnid").as_deref() == Some(reference_id);
            let same_payment =
                payment_id.is_some() && text(details, "mihpayid").as_deref() == payment_id;
            if !(same_txnid || same_payment) {
                return Err(format!(
                    "Gateway response does not describe transaction {}",
                    reference_id
                ));
            }
            details
        }
    };

    let raw_status = text(entry, "status")
        .or_else(|| text(entry, "unmappedstatus"))
        .unwrap_or_default();
    let mihpayid = text(entry, "mihpayid");

    let status = if mihpayid
        .as_deref()
        .is_some_and(|id| id.eq_ignore_ascii_case("not found"))
    {
        GatewayStatus::NotFound
    } else {
        GatewayStatus::from_gateway(&raw_status)
    };

    let message = text(entry, "error_Message")
        .or_else(|| text(entry, "Error_Message"))
        .or_else(|| text(entry, "field9"))
        .filter(|m| !m.eq_ignore_ascii_case("no error"));

    Ok(GatewayTransaction {
        gateway_payment_id: mihpayid.filter(|_| status != GatewayStatus::NotFound),
        status,
        amount: text(entry, "amt").or_else(|| text(entry, "transaction_amount")),
        message,
        raw: entry.clone(),
    })
}

impl VerificationClient {
    pub fn new(
        config: Arc<GatewayConfig>,
        transactions: Arc<dyn TransactionStore>,
        gateway: Arc<dyn GatewayClient>,
    ) -> Self {
        Self {
            config,
            transactions,
            gateway,
        }
    }

    /// Ask the gateway about `reference_id` and settle the stored transaction.
    ///
    /// # Process
    ///
    /// 1. Load the local transaction
    /// 2. Run a signed `verify_payment` query
    /// 3. If the gateway reports a terminal status and the transaction is
    ///    still `pending`, apply it through the conditional update
    ///
    /// A result that contradicts a settled transaction, or whose amount
    /// differs from the stored one, flags the transaction instead.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: blank reference id
    /// - `TransactionNotFound`: unknown locally or at the gateway
    /// - `Configuration`: merchant credentials missing
    /// - `Database`: store failure
    ///
    /// Transport failures and answers that do not describe this payment are
    /// not errors: they yield a result with status `error`.
    pub async fn verify(&self, reference_id: &str) -> Result<StatusResult, AppError> {
        let reference_id = reference_id.trim();
        if reference_id.is_empty() {
            return Err(AppError::InvalidRequest(
                "Transaction id is required".to_string(),
            ));
        }

        let transaction = self
            .transactions
            .find_by_reference(reference_id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(reference_id.to_string()))?;

        let details = match self.run(reference_id, VERIFY_PAYMENT, reference_id).await? {
            QueryOutcome::Found(details) => details,
            QueryOutcome::Inconclusive(message) => {
                return Ok(StatusResult::error(reference_id, message));
            }
        };

        let reconciled = self.reconcile(&transaction, &details).await?;
        Ok(self.result(reference_id, details, reconciled))
    }

    /// Read-only status lookup.
    ///
    /// Uses `check_payment` with the stored gateway payment id when known,
    /// `verify_payment` with the reference id otherwise.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: blank reference id
    /// - `TransactionNotFound`: the gateway does not know the payment
    /// - `Configuration`: merchant credentials missing
    pub async fn get_status(&self, reference_id: &str) -> Result<StatusResult, AppError> {
        let reference_id = reference_id.trim();
        if reference_id.is_empty() {
            return Err(AppError::InvalidRequest(
                "Transaction id is required".to_string(),
            ));
        }

        let payment_id = self
            .transactions
            .find_by_reference(reference_id)
            .await?
            .and_then(|tx| tx.gateway_payment_id);

        let outcome = match payment_id.as_deref() {
            Some(payment_id) => self.run(reference_id, CHECK_PAYMENT, payment_id).await?,
            None => self.run(reference_id, VERIFY_PAYMENT, reference_id).await?,
        };

        match outcome {
            QueryOutcome::Found(details) => Ok(self.result(reference_id, details, false)),
            QueryOutcome::Inconclusive(message) => Ok(StatusResult::error(reference_id, message)),
        }
    }

    /// Sign and send one reporting command; gateway failures become `Inconclusive`.
    async fn run(
        &self,
        reference_id: &str,
        command: &str,
        var1: &str,
    ) -> Result<QueryOutcome, AppError> {
        let signer = HashSigner::from_config(&self.config)?;
        let query = StatusQuery {
            key: signer.key().to_string(),
            command: command.to_string(),
            var1: var1.to_string(),
            hash: signer.sign_command(command, var1),
        };

        let body = match self.gateway.query_status(&query).await {
            Ok(body) => body,
            Err(AppError::Gateway(message)) => {
                tracing::warn!(reference_id = %reference_id, command, error = %message, "status query failed");
                return Ok(QueryOutcome::Inconclusive(message));
            }
            Err(e) => return Err(e),
        };

        let payment_id = (command == CHECK_PAYMENT).then_some(var1);
        match parse_details(reference_id, payment_id, &body) {
            Ok(details) if details.status == GatewayStatus::NotFound => {
                Err(AppError::TransactionNotFound(reference_id.to_string()))
            }
            Ok(details) => Ok(QueryOutcome::Found(details)),
            Err(message) => {
                tracing::warn!(reference_id = %reference_id, command, error = %message, "inconclusive status answer");
                Ok(QueryOutcome::Inconclusive(message))
            }
        }
    }

    /// Apply a terminal gateway status to the stored transaction; returns
    /// whether this call performed the transition.
    async fn reconcile(
        &self,
        transaction: &Transaction,
        details: &GatewayTransaction,
    ) -> Result<bool, AppError> {
        let Some(target) = details.status.terminal_status() else {
            return Ok(false);
        };
        let reference_id = transaction.reference_id.as_str();

        let amount_matches = details
            .amount
            .as_deref()
            .and_then(|a| Decimal::from_str(a).ok())
            .is_none_or(|a| a.round_dp(2) == transaction.amount.round_dp(2));
        if !amount_matches {
            self.flag(
                reference_id,
                &format!(
                    "gateway reports amount {} but stored amount is {}",
                    details.amount.as_deref().unwrap_or_default(),
                    format_amount(transaction.amount)
                ),
            )
            .await;
            return Ok(false);
        }

        let current = if transaction.status == TransactionStatus::Pending {
            let update = TransitionUpdate {
                status: target,
                gateway_payment_id: details.gateway_payment_id.clone(),
                raw_callback_payload: Some(details.raw.clone()),
            };
            if self
                .transactions
                .update_if_status(reference_id, TransactionStatus::Pending, update)
                .await?
            {
                tracing::info!(reference_id = %reference_id, status = %target, "transaction reconciled by verification");
                return Ok(true);
            }

            self.transactions
                .find_by_reference(reference_id)
                .await?
                .map(|tx| tx.status)
                .unwrap_or(transaction.status)
        } else {
            transaction.status
        };

        if current != target {
            self.flag(
                reference_id,
                &format!(
                    "gateway reports {} but transaction settled as {}",
                    target, current
                ),
            )
            .await;
        }
        Ok(false)
    }

    fn result(
        &self,
        reference_id: &str,
        details: GatewayTransaction,
        reconciled: bool,
    ) -> StatusResult {
        StatusResult {
            reference_id: reference_id.to_string(),
            status: details
                .status
                .terminal_status()
                .unwrap_or(TransactionStatus::Pending),
            gateway_payment_id: details.gateway_payment_id,
            amount: details.amount,
            message: details.message,
            reconciled,
        }
    }

    async fn flag(&self, reference_id: &str, note: &str) {
        tracing::warn!(reference_id = %reference_id, note = %note, "transaction flagged for review");
        if let Err(e) = self.transactions.flag_for_review(reference_id, note).await {
            tracing::error!(reference_id = %reference_id, error = %e, "failed to flag transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gateway::{GatewayInitiation, InitiationPayload};
    use crate::store::memory::InMemoryTransactionStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every status query with a canned body, or a transport error.
    struct CannedGateway {
        response: Result<Value, String>,
        queries: Mutex<Vec<StatusQuery>>,
    }

    impl CannedGateway {
        fn answering(body: Value) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(body),
                queries: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Err(message.to_string()),
                queries: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GatewayClient for CannedGateway {
        async fn initiate(&self, _payload: &InitiationPayload) -> Result<GatewayInitiation, AppError> {
            unreachable!("not used by verification")
        }

        async fn query_status(&self, query: &StatusQuery) -> Result<Value, AppError> {
            self.queries.lock().unwrap().push(query.clone());
            self.response.clone().map_err(AppError::Gateway)
        }
    }

    async fn store_with_pending() -> InMemoryTransactionStore {
        let store = InMemoryTransactionStore::new();
        store
            .create(&Transaction::pending("TXN1".to_string(), dec!(100.00), None))
            .await
            .unwrap();
        store
    }

    fn client(store: &InMemoryTransactionStore, gateway: Arc<CannedGateway>) -> VerificationClient {
        VerificationClient::new(
            Arc::new(GatewayConfig::for_tests()),
            Arc::new(store.clone()),
            gateway,
        )
    }

    fn verify_body(status: &str, amount: &str) -> Value {
        json!({
            "status": 1,
            "msg": "1 out of 1 Transactions Fetched Successfully",
            "transaction_details": {
                "TXN1": {
                    "mihpayid": "403993715521937565",
                    "txnid": "TXN1",
                    "amt": amount,
                    "status": status,
                    "unmappedstatus": "captured",
                    "error_Message": "No Error"
                }
            }
        })
    }

    #[tokio::test]
    async fn test_gateway_success_reconciles_pending_transaction() {
        let store = store_with_pending().await;
        let gateway = CannedGateway::answering(verify_body("success", "100.00"));
        let verifier = client(&store, gateway.clone());

        let result = verifier.verify("TXN1").await.unwrap();

        assert_eq!(result.status, TransactionStatus::Success);
        assert!(result.reconciled);
        assert_eq!(result.message, None);
        let tx = store.find_by_reference("TXN1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(tx.gateway_payment_id.as_deref(), Some("403993715521937565"));

        let queries = gateway.queries.lock().unwrap();
        assert_eq!(queries[0].command, "verify_payment");
        assert_eq!(queries[0].var1, "TXN1");
        assert_eq!(
            queries[0].hash,
            crate::services::hash_signer::sha512_hex("gtKFFx|verify_payment|TXN1|eCwWELxi")
        );
    }

    #[tokio::test]
    async fn test_second_verification_does_not_reconcile_again() {
        let store = store_with_pending().await;
        let verifier = client(&store, CannedGateway::answering(verify_body("success", "100.00")));

        assert!(verifier.verify("TXN1").await.unwrap().reconciled);
        let again = verifier.verify("TXN1").await.unwrap();

        assert!(!again.reconciled);
        assert_eq!(again.status, TransactionStatus::Success);
        let tx = store.find_by_reference("TXN1").await.unwrap().unwrap();
        assert!(tx.review_note.is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_yields_error_without_mutation() {
        let store = store_with_pending().await;
        let verifier = client(&store, CannedGateway::failing("Gateway status query timed out"));

        let result = verifier.verify("TXN1").await.unwrap();

        assert_eq!(result.status, TransactionStatus::Error);
        assert_eq!(result.message.as_deref(), Some("Gateway status query timed out"));
        let tx = store.find_by_reference("TXN1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_gateway_not_found_is_not_found_error() {
        let store = store_with_pending().await;
        let body = json!({
            "status": 0,
            "msg": "0 out of 1 Transactions Fetched Successfully",
            "transaction_details": {
                "TXN1": { "mihpayid": "Not Found", "status": "Not Found" }
            }
        });
        let verifier = client(&store, CannedGateway::answering(body));

        let err = verifier.verify("TXN1").await.unwrap_err();
        assert!(matches!(err, AppError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_local_reference_is_not_found() {
        let store = InMemoryTransactionStore::new();
        let gateway = CannedGateway::answering(verify_body("success", "100.00"));
        let verifier = client(&store, gateway.clone());

        let err = verifier.verify("TXN1").await.unwrap_err();

        assert!(matches!(err, AppError::TransactionNotFound(_)));
        assert!(gateway.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_amount_mismatch_flags_instead_of_settling() {
        let store = store_with_pending().await;
        let verifier = client(&store, CannedGateway::answering(verify_body("success", "1.00")));

        let result = verifier.verify("TXN1").await.unwrap();

        assert!(!result.reconciled);
        let tx = store.find_by_reference("TXN1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.review_note.is_some());
    }

    #[tokio::test]
    async fn test_get_status_uses_check_payment_when_payment_id_known() {
        let store = store_with_pending().await;
        store
            .update_if_status(
                "TXN1",
                TransactionStatus::Pending,
                TransitionUpdate {
                    status: TransactionStatus::Success,
                    gateway_payment_id: Some("403993715521937565".to_string()),
                    raw_callback_payload: None,
                },
            )
            .await
            .unwrap();

        let body = json!({
            "status": 1,
            "msg": "Transaction Fetched Successfully",
            "transaction_details": {
                "mihpayid": "403993715521937565",
                "txnid": "TXN1",
                "amt": "100.00",
                "status": "success"
            }
        });
        let gateway = CannedGateway::answering(body);
        let verifier = client(&store, gateway.clone());

        let result = verifier.get_status("TXN1").await.unwrap();

        assert_eq!(result.status, TransactionStatus::Success);
        assert!(!result.reconciled);
        let queries = gateway.queries.lock().unwrap();
        assert_eq!(queries[0].command, "check_payment");
        assert_eq!(queries[0].var1, "403993715521937565");
    }

    #[tokio::test]
    async fn test_get_status_never_mutates() {
        let store = store_with_pending().await;
        let verifier = client(&store, CannedGateway::answering(verify_body("failure", "100.00")));

        let result = verifier.get_status("TXN1").await.unwrap();

        assert_eq!(result.status, TransactionStatus::Failed);
        let tx = store.find_by_reference("TXN1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_entry_for_another_transaction_never_settles() {
        let store = store_with_pending().await;
        let body = json!({
            "status": 1,
            "transaction_details": {
                "TXN2": { "mihpayid": "999", "txnid": "TXN2", "amt": "100.00", "status": "success" }
            }
        });
        let verifier = client(&store, CannedGateway::answering(body));

        let result = verifier.verify("TXN1").await.unwrap();

        assert_eq!(result.status, TransactionStatus::Error);
        assert!(!result.reconciled);
        let tx = store.find_by_reference("TXN1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.gateway_payment_id, None);
    }

    #[tokio::test]
    async fn test_flat_answer_for_another_transaction_never_settles() {
        let store = store_with_pending().await;
        let body = json!({
            "status": 1,
            "transaction_details": { "mihpayid": "999", "txnid": "TXN2", "amt": "100.00", "status": "success" }
        });
        let verifier = client(&store, CannedGateway::answering(body));

        let result = verifier.verify("TXN1").await.unwrap();

        assert_eq!(result.status, TransactionStatus::Error);
        let tx = store.find_by_reference("TXN1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_gateway_rejection_without_details_is_error_result() {
        let store = store_with_pending().await;
        let verifier = client(
            &store,
            CannedGateway::answering(json!({ "status": 0, "msg": "Invalid Hash." })),
        );

        let result = verifier.verify("TXN1").await.unwrap();

        assert_eq!(result.status, TransactionStatus::Error);
        assert_eq!(result.message.as_deref(), Some("Invalid Hash."));
        let tx = store.find_by_reference("TXN1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[test]
    fn test_in_progress_status_reports_pending() {
        let details = parse_details("TXN1", None, &verify_body("in progress", "100.00")).unwrap();
        assert_eq!(details.status, GatewayStatus::Pending);
        assert_eq!(details.message, None);
    }
}

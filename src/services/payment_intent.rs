//! Payment initiation.
//!
//! Creates the `pending` transaction, signs the checkout form and hands it to
//! the gateway client.
//!
//! # Guarantees
//!
//! - Missing credentials fail before anything is written.
//! - Exactly one transaction row per successful validation.
//! - A gateway failure leaves the row `pending`; verification can settle it later.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::models::customer::NewCustomer;
use crate::models::gateway::{InitiationPayload, IntentResult};
use crate::models::transaction::{CreatePaymentRequest, Transaction};
use crate::services::gateway_client::GatewayClient;
use crate::services::hash_signer::{HashSigner, PaymentHashFields, format_amount};
use crate::store::{CustomerStore, TransactionStore};

/// PayU rejects `txnid` values longer than this.
const MAX_REFERENCE_LEN: usize = 25;

pub struct PaymentIntentService {
    config: Arc<GatewayConfig>,
    transactions: Arc<dyn TransactionStore>,
    customers: Option<Arc<dyn CustomerStore>>,
    gateway: Arc<dyn GatewayClient>,
}

/// Fresh reference id: `TXN`, epoch milliseconds, 8 random hex digits.
///
/// The random suffix keeps ids unique across concurrent calls in the same millisecond.
pub fn generate_reference_id() -> String {
    let suffix: u32 = rand::random();
    let id = format!("TXN{}{:08x}", Utc::now().timestamp_millis(), suffix);
    debug_assert!(id.len() <= MAX_REFERENCE_LEN);
    id
}

impl PaymentIntentService {
    pub fn new(
        config: Arc<GatewayConfig>,
        transactions: Arc<dyn TransactionStore>,
        customers: Option<Arc<dyn CustomerStore>>,
        gateway: Arc<dyn GatewayClient>,
    ) -> Self {
        Self {
            config,
            transactions,
            customers,
            gateway,
        }
    }

    /// Start a payment for the given customer and amount.
    ///
    /// # Process
    ///
    /// 1. Validate input and load merchant credentials
    /// 2. Upsert the customer (when customer persistence is enabled)
    /// 3. Persist a `pending` transaction under a new reference id
    /// 4. Sign and submit the checkout form
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: amount not positive, or blank name/email
    /// - `Configuration`: merchant key or salt missing (nothing persisted)
    /// - `Gateway`: PayU call failed (transaction stays `pending`)
    /// - `Database`: store failure
    pub async fn create_intent(
        &self,
        customer_name: &str,
        customer_email: &str,
        customer_phone: &str,
        amount: Decimal,
    ) -> Result<IntentResult, AppError> {
        let customer_name = customer_name.trim();
        let customer_email = customer_email.trim();
        let customer_phone = customer_phone.trim();

        let amount = amount.round_dp(2);
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidRequest(
                "Amount must be positive".to_string(),
            ));
        }
        if customer_name.is_empty() || customer_email.is_empty() {
            return Err(AppError::InvalidRequest(
                "Customer name and email are required".to_string(),
            ));
        }

        let signer = HashSigner::from_config(&self.config)?;

        let customer = match &self.customers {
            Some(customers) => Some(
                customers
                    .upsert(&NewCustomer {
                        name: customer_name.to_string(),
                        email: customer_email.to_string(),
                        contact: customer_phone.to_string(),
                    })
                    .await?,
            ),
            None => None,
        };

        let reference_id = generate_reference_id();
        let transaction = Transaction::pending(
            reference_id.clone(),
            amount,
            customer.as_ref().map(|c| c.id),
        );
        self.transactions.create(&transaction).await?;

        if let (Some(customers), Some(customer)) = (&self.customers, &customer) {
            customers.append_payment(customer.id, &reference_id).await?;
        }

        let amount_text = format_amount(amount);
        let productinfo = format!("{} for {} INR", self.config.product_label, amount_text);

        let hash = signer.sign_payment(&PaymentHashFields {
            txnid: &reference_id,
            amount: &amount_text,
            productinfo: &productinfo,
            firstname: customer_name,
            email: customer_email,
            udf: ["", "", "", "", ""],
        });

        let payload = InitiationPayload {
            key: signer.key().to_string(),
            txnid: reference_id.clone(),
            amount: amount_text.clone(),
            productinfo,
            firstname: customer_name.to_string(),
            email: customer_email.to_string(),
            phone: customer_phone.to_string(),
            surl: self.config.success_callback_url(),
            furl: self.config.failure_callback_url(),
            currency: "INR".to_string(),
            udf1: String::new(),
            udf2: String::new(),
            udf3: String::new(),
            udf4: String::new(),
            udf5: String::new(),
            hash,
        };

        tracing::info!(reference_id = %reference_id, amount = %amount_text, "payment intent created");

        let gateway = self.gateway.initiate(&payload).await.inspect_err(|e| {
            tracing::warn!(reference_id = %reference_id, error = %e, "gateway initiation failed, transaction left pending");
        })?;

        Ok(IntentResult {
            reference_id,
            amount: amount_text,
            gateway,
        })
    }

    /// Convenience wrapper for the JSON endpoint.
    pub async fn create_from_request(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<IntentResult, AppError> {
        self.create_intent(
            &request.customer_name,
            &request.customer_email,
            &request.customer_phone,
            request.amount,
        )
        .await
    }
}

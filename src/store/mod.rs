//! Persistence contracts used by the payment services.
//!
//! Services only see these traits. [`postgres`] backs them with sqlx,
//! [`memory`] keeps everything in process for tests and local runs.
//!
//! All writes to a transaction's status go through
//! [`TransactionStore::update_if_status`]; there is no blind overwrite.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::customer::{Customer, NewCustomer};
use crate::models::transaction::{Transaction, TransactionStatus, TransitionUpdate};
use crate::models::webhook::WebhookRecord;

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new transaction. Fails if the reference id already exists.
    async fn create(&self, transaction: &Transaction) -> Result<(), AppError>;

    async fn find_by_reference(&self, reference_id: &str) -> Result<Option<Transaction>, AppError>;

    /// Apply `update` only while the stored status equals `expected`.
    ///
    /// Returns `false` when the row is missing or its status already moved on.
    async fn update_if_status(
        &self,
        reference_id: &str,
        expected: TransactionStatus,
        update: TransitionUpdate,
    ) -> Result<bool, AppError>;

    /// Attach a manual-review note without touching the status.
    async fn flag_for_review(&self, reference_id: &str, note: &str) -> Result<(), AppError>;

    /// Cheap connectivity check for the health endpoint.
    async fn ping(&self) -> Result<(), AppError>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn append(&self, record: &WebhookRecord) -> Result<(), AppError>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Insert or refresh the customer identified by `customer.email`.
    async fn upsert(&self, customer: &NewCustomer) -> Result<Customer, AppError>;

    async fn append_payment(&self, customer_id: Uuid, reference_id: &str) -> Result<(), AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, AppError>;
}

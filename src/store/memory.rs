//! In-process stores.
//!
//! Each store is an `Arc<RwLock<..>>`, so clones share state. The write lock
//! makes `update_if_status` a real check-and-set.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CustomerStore, TransactionStore, WebhookStore};
use crate::error::AppError;
use crate::models::customer::{Customer, NewCustomer};
use crate::models::transaction::{Transaction, TransactionStatus, TransitionUpdate};
use crate::models::webhook::WebhookRecord;

/// Transactions keyed by reference id.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<String, Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn create(&self, transaction: &Transaction) -> Result<(), AppError> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&transaction.reference_id) {
            return Err(AppError::InvalidRequest(format!(
                "Duplicate reference id {}",
                transaction.reference_id
            )));
        }
        transactions.insert(transaction.reference_id.clone(), transaction.clone());
        Ok(())
    }

    async fn find_by_reference(&self, reference_id: &str) -> Result<Option<Transaction>, AppError> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(reference_id).cloned())
    }

    async fn update_if_status(
        &self,
        reference_id: &str,
        expected: TransactionStatus,
        update: TransitionUpdate,
    ) -> Result<bool, AppError> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(reference_id) {
            Some(tx) if tx.status == expected => {
                tx.status = update.status;
                tx.gateway_payment_id = update.gateway_payment_id;
                tx.raw_callback_payload = update.raw_callback_payload;
                tx.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn flag_for_review(&self, reference_id: &str, note: &str) -> Result<(), AppError> {
        let mut transactions = self.transactions.write().await;
        if let Some(tx) = transactions.get_mut(reference_id) {
            tx.review_note = Some(note.to_string());
            tx.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Append-only audit log.
#[derive(Default, Clone)]
pub struct InMemoryWebhookStore {
    records: Arc<RwLock<Vec<WebhookRecord>>>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, oldest first.
    pub async fn records(&self) -> Vec<WebhookRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn append(&self, record: &WebhookRecord) -> Result<(), AppError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

/// Customers keyed by email.
#[derive(Default, Clone)]
pub struct InMemoryCustomerStore {
    customers: Arc<RwLock<HashMap<String, Customer>>>,
}

impl InMemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn upsert(&self, customer: &NewCustomer) -> Result<Customer, AppError> {
        let mut customers = self.customers.write().await;
        let entry = customers
            .entry(customer.email.clone())
            .or_insert_with(|| Customer {
                id: Uuid::new_v4(),
                name: String::new(),
                email: customer.email.clone(),
                contact: String::new(),
                payments: Vec::new(),
            });
        entry.name = customer.name.clone();
        entry.contact = customer.contact.clone();
        Ok(entry.clone())
    }

    async fn append_payment(&self, customer_id: Uuid, reference_id: &str) -> Result<(), AppError> {
        let mut customers = self.customers.write().await;
        if let Some(customer) = customers.values_mut().find(|c| c.id == customer_id) {
            customer.payments.push(reference_id.to_string());
        }
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, AppError> {
        Ok(self.customers.read().await.get(email).cloned())
    }
}

//! PostgreSQL-backed stores.
//!
//! The conditional transition is a single `UPDATE ... WHERE status = $2`,
//! so concurrent callbacks for one reference id serialize on the row lock
//! and the loser sees zero affected rows.

use async_trait::async_trait;
use uuid::Uuid;

use super::{CustomerStore, TransactionStore, WebhookStore};
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::customer::{Customer, NewCustomer};
use crate::models::transaction::{Transaction, TransactionRow, TransactionStatus, TransitionUpdate};
use crate::models::webhook::WebhookRecord;

#[derive(Clone)]
pub struct PgTransactionStore {
    pool: DbPool,
}

impl PgTransactionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn create(&self, transaction: &Transaction) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id,
                reference_id,
                amount,
                status,
                customer_id,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.reference_id)
        .bind(transaction.amount)
        .bind(transaction.status.as_str())
        .bind(transaction.customer_id)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_reference(&self, reference_id: &str) -> Result<Option<Transaction>, AppError> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, reference_id, amount, status, gateway_payment_id,
                   raw_callback_payload, customer_id, review_note, created_at, updated_at
            FROM transactions
            WHERE reference_id = $1
            "#,
        )
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Transaction::try_from).transpose()?)
    }

    async fn update_if_status(
        &self,
        reference_id: &str,
        expected: TransactionStatus,
        update: TransitionUpdate,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $3,
                gateway_payment_id = $4,
                raw_callback_payload = $5,
                updated_at = NOW()
            WHERE reference_id = $1 AND status = $2
            "#,
        )
        .bind(reference_id)
        .bind(expected.as_str())
        .bind(update.status.as_str())
        .bind(update.gateway_payment_id)
        .bind(update.raw_callback_payload)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn flag_for_review(&self, reference_id: &str, note: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE transactions SET review_note = $2, updated_at = NOW() WHERE reference_id = $1",
        )
        .bind(reference_id)
        .bind(note)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgWebhookStore {
    pool: DbPool,
}

impl PgWebhookStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookStore for PgWebhookStore {
    async fn append(&self, record: &WebhookRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_records (
                id,
                event,
                reference_id,
                verified,
                raw_payload,
                normalized_payload,
                received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.event)
        .bind(&record.reference_id)
        .bind(record.verified)
        .bind(&record.raw_payload)
        .bind(&record.normalized_payload)
        .bind(record.received_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct PgCustomerStore {
    pool: DbPool,
}

impl PgCustomerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerStore for PgCustomerStore {
    async fn upsert(&self, customer: &NewCustomer) -> Result<Customer, AppError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            WITH upserted AS (
                INSERT INTO customers (id, name, email, contact)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (email)
                DO UPDATE SET name = EXCLUDED.name, contact = EXCLUDED.contact
                RETURNING id, name, email, contact
            )
            SELECT u.id, u.name, u.email, u.contact,
                   ARRAY(
                       SELECT cp.reference_id::TEXT
                       FROM customer_payments cp
                       WHERE cp.customer_id = u.id
                       ORDER BY cp.id
                   ) AS payments
            FROM upserted u
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.contact)
        .fetch_one(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn append_payment(&self, customer_id: Uuid, reference_id: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO customer_payments (customer_id, reference_id) VALUES ($1, $2)")
            .bind(customer_id)
            .bind(reference_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, AppError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT c.id, c.name, c.email, c.contact,
                   ARRAY(
                       SELECT cp.reference_id::TEXT
                       FROM customer_payments cp
                       WHERE cp.customer_id = c.id
                       ORDER BY cp.id
                   ) AS payments
            FROM customers c
            WHERE c.email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }
}

//! Customer model.
//!
//! Customers are optional: a payment can exist without one. When customer
//! persistence is enabled, a customer is upserted by email on every payment
//! initiation and the new reference id is appended to its payment list.

use serde::Serialize;
use uuid::Uuid;

/// A paying customer and the reference ids of their payments, oldest first.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub contact: String,

    /// Append-only list of transaction reference ids
    pub payments: Vec<String>,
}

/// Identity fields supplied at initiation time.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub contact: String,
}

//! Data models for database entities and API requests/responses.

/// Inbound gateway callback payloads
pub mod callback;
/// Customer records
pub mod customer;
/// Gateway request/response types
pub mod gateway;
/// Payment transactions
pub mod transaction;
/// Callback audit records
pub mod webhook;

//! PayU payment reconciliation service.
//!
//! Starts payments with the PayU hosted checkout, receives and verifies the
//! gateway's callbacks, settles each transaction exactly once, and answers
//! on-demand verification queries against the PayU reporting API.
//!
//! # Layout
//!
//! - [`services`]: hash signing, gateway client, intent creation, callback
//!   reconciliation, verification
//! - [`store`]: persistence traits with Postgres and in-memory backends
//! - [`handlers`] / [`app`]: the thin axum surface over the services

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;

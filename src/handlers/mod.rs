//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON or form body, URL params, query string)
//! 2. Delegates to a service from [`crate::app::AppState`]
//! 3. Returns an HTTP response (JSON, redirect, status code)

/// Gateway callback endpoints
pub mod callbacks;
/// Service monitoring
pub mod health;
/// Payment initiation, verification and lookup endpoints
pub mod payments;

//! Business logic services.
//!
//! Services contain the reconciliation core separated from HTTP handlers.
//! They depend on the store and gateway traits only, so tests run them
//! against in-memory stores and fake gateways.

pub mod callback_processor;
pub mod gateway_client;
pub mod hash_signer;
pub mod payment_intent;
pub mod verification;

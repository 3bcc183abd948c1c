//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct,
//! then splits the gateway-related values into a [`GatewayConfig`] that is injected into each service.

use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PAYU_MERCHANT_KEY` / `PAYU_MERCHANT_SALT` (optional at startup): gateway credentials
/// - `PAYU_MODE` (optional): `test` (default) or `production`
/// - `PAYU_BASE_URL` (optional): overrides the PayU hosts for both checkout and reporting
/// - `PUBLIC_BASE_URL` (optional): this service's own public URL, used for callback URLs
/// - `FRONTEND_URL` (optional): merchant front-end, used for final redirects
/// - `GATEWAY_TIMEOUT_SECS` (optional): outbound gateway timeout, defaults to 10
/// - `PRODUCT_LABEL` (optional): prefix of the product description sent to PayU
/// - `PERSIST_CUSTOMERS` (optional): store customer records on initiation, defaults to true
/// - `REJECT_INVALID_SIGNATURES` (optional): answer forged callbacks with 400, defaults to true
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub payu_merchant_key: Option<String>,

    pub payu_merchant_salt: Option<String>,

    #[serde(default)]
    pub payu_mode: GatewayMode,

    pub payu_base_url: Option<String>,

    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    #[serde(default = "default_timeout_secs")]
    pub gateway_timeout_secs: u64,

    #[serde(default = "default_product_label")]
    pub product_label: String,

    #[serde(default = "default_true")]
    pub persist_customers: bool,

    #[serde(default = "default_true")]
    pub reject_invalid_signatures: bool,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_product_label() -> String {
    "Payment".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: payu_merchant_key -> PAYU_MERCHANT_KEY
        envy::from_env::<Config>()
    }

    /// Extract the gateway-facing part of the configuration.
    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            merchant_key: self.payu_merchant_key.clone(),
            merchant_salt: self.payu_merchant_salt.clone(),
            mode: self.payu_mode,
            base_url: self.payu_base_url.clone(),
            public_base_url: self.public_base_url.clone(),
            frontend_url: self.frontend_url.clone(),
            timeout: Duration::from_secs(self.gateway_timeout_secs),
            product_label: self.product_label.clone(),
        }
    }
}

/// PayU operating mode.
///
/// Anything other than `production`/`live` is treated as the sandbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    #[default]
    Test,
    #[serde(alias = "live", alias = "prod")]
    Production,
}

/// Gateway settings shared by every payment service.
///
/// Built once at startup and passed explicitly to the services that need it.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub merchant_key: Option<String>,
    pub merchant_salt: Option<String>,
    pub mode: GatewayMode,
    pub base_url: Option<String>,
    pub public_base_url: String,
    pub frontend_url: String,
    pub timeout: Duration,
    pub product_label: String,
}

/// Merchant key and salt, present and non-empty.
#[derive(Debug, Clone)]
pub struct MerchantCredentials {
    pub key: String,
    pub salt: String,
}

impl GatewayConfig {
    /// Return the merchant credentials or a configuration error when either is missing.
    pub fn credentials(&self) -> Result<MerchantCredentials, AppError> {
        let key = self
            .merchant_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let salt = self
            .merchant_salt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (key, salt) {
            (Some(key), Some(salt)) => Ok(MerchantCredentials {
                key: key.to_string(),
                salt: salt.to_string(),
            }),
            _ => Err(AppError::Configuration(
                "PAYU_MERCHANT_KEY and PAYU_MERCHANT_SALT must be set".to_string(),
            )),
        }
    }

    /// Hosted checkout endpoint that receives the initiation form.
    pub fn payment_url(&self) -> String {
        match (&self.base_url, self.mode) {
            (Some(base), _) => format!("{}/_payment", base.trim_end_matches('/')),
            (None, GatewayMode::Test) => "https://test.payu.in/_payment".to_string(),
            (None, GatewayMode::Production) => "https://secure.payu.in/_payment".to_string(),
        }
    }

    /// Reporting API endpoint used for verification queries.
    pub fn query_url(&self) -> String {
        let base = match (&self.base_url, self.mode) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, GatewayMode::Test) => "https://test.payu.in".to_string(),
            (None, GatewayMode::Production) => "https://info.payu.in".to_string(),
        };
        format!("{}/merchant/postservice.php?form=2", base)
    }

    /// Callback URL PayU posts to after a successful payment.
    pub fn success_callback_url(&self) -> String {
        format!(
            "{}/api/payu/success",
            self.public_base_url.trim_end_matches('/')
        )
    }

    /// Callback URL PayU posts to after a failed payment.
    pub fn failure_callback_url(&self) -> String {
        format!(
            "{}/api/payu/failure",
            self.public_base_url.trim_end_matches('/')
        )
    }

    /// Front-end page the end user lands on after a callback.
    pub fn frontend_page(&self, page: &str) -> String {
        format!(
            "{}/payment/{}",
            self.frontend_url.trim_end_matches('/'),
            page
        )
    }
}

#[cfg(test)]
impl GatewayConfig {
    /// Sandbox configuration with fixed credentials for unit tests.
    pub fn for_tests() -> Self {
        Self {
            merchant_key: Some("gtKFFx".to_string()),
            merchant_salt: Some("eCwWELxi".to_string()),
            mode: GatewayMode::Test,
            base_url: None,
            public_base_url: "https://api.example.com".to_string(),
            frontend_url: "https://shop.example.com".to_string(),
            timeout: Duration::from_secs(10),
            product_label: "Payment".to_string(),
        }
    }
}

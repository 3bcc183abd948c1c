//! HTTP client for the PayU checkout and reporting endpoints.
//!
//! Services depend on the [`GatewayClient`] trait; [`PayuClient`] is the
//! reqwest implementation. Both calls are single attempts with the configured
//! timeout. Redirects are not followed so the hosted page URL can be handed to
//! the end user instead of being fetched here.

use async_trait::async_trait;
use reqwest::{StatusCode, header::LOCATION, redirect::Policy};

use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::models::gateway::{GatewayInitiation, InitiationPayload, StatusQuery};

#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Submit a signed checkout form and return what the user should be shown.
    async fn initiate(&self, payload: &InitiationPayload) -> Result<GatewayInitiation, AppError>;

    /// Run a signed reporting API command and return the decoded JSON body.
    async fn query_status(&self, query: &StatusQuery) -> Result<serde_json::Value, AppError>;
}

#[derive(Debug, Clone)]
pub struct PayuClient {
    http: reqwest::Client,
    payment_url: String,
    query_url: String,
}

impl PayuClient {
    /// Build a client bound to the hosts of `config`.
    ///
    /// # Errors
    ///
    /// `Gateway` if the underlying HTTP client cannot be constructed.
    pub fn new(config: &GatewayConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| AppError::Gateway(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            payment_url: config.payment_url(),
            query_url: config.query_url(),
        })
    }
}

/// Keep gateway error bodies short enough for logs and error messages.
fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

#[async_trait]
impl GatewayClient for PayuClient {
    async fn initiate(&self, payload: &InitiationPayload) -> Result<GatewayInitiation, AppError> {
        let response = self
            .http
            .post(&self.payment_url)
            .form(payload)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Payment initiation failed: {}", e)))?;

        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| {
                    AppError::Gateway("Gateway redirect without a Location header".to_string())
                })?;

            // PayU sometimes answers with a path relative to its own host
            let url = url::Url::parse(&self.payment_url)
                .and_then(|base| base.join(location))
                .map_err(|e| AppError::Gateway(format!("Invalid redirect location: {}", e)))?;

            return Ok(GatewayInitiation::Redirect {
                url: url.to_string(),
            });
        }

        if status.is_success() {
            // Hosted checkout rendered inline; let the browser post the form itself.
            return Ok(GatewayInitiation::Form {
                action: self.payment_url.clone(),
                fields: payload.to_fields(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(AppError::Gateway(format!(
            "Gateway rejected initiation with {}: {}",
            status,
            snippet(&body)
        )))
    }

    async fn query_status(&self, query: &StatusQuery) -> Result<serde_json::Value, AppError> {
        let response = self
            .http
            .post(&self.query_url)
            .form(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Gateway("Gateway status query timed out".to_string())
                } else {
                    AppError::Gateway(format!("Gateway status query failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to read gateway response: {}", e)))?;

        if status != StatusCode::OK {
            return Err(AppError::Gateway(format!(
                "Gateway status query returned {}: {}",
                status,
                snippet(&body)
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            AppError::Gateway(format!(
                "Unreadable gateway response ({}): {}",
                e,
                snippet(&body)
            ))
        })
    }
}

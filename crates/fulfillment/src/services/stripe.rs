//! HTTP client for Stripe-compatible checkout sessions.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::payment_provider::{CheckoutSession, CheckoutSessionRequest, PaymentProvider};
use crate::error::{FulfillmentError, Result};

/// Opens hosted checkout sessions through the provider's REST API.
#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

impl StripeClient {
    /// Creates a client. `base_url` is e.g. `https://api.stripe.com`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FulfillmentError::provider(format!("http client: {e}"), false))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn form(request: &CheckoutSessionRequest) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("client_reference_id", request.order_id.to_string()),
            ("customer_email", request.customer_email.clone()),
            ("payment_method_types[0]", request.payment_method.as_str().to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("expires_at", request.expires_at.timestamp().to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", request.currency.clone()),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount.cents().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                format!("Order {}", request.order_id),
            ),
        ]
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.api_key)
            .form(&Self::form(request))
            .send()
            .await
            .map_err(|e| {
                let retryable = e.is_timeout() || e.is_connect();
                FulfillmentError::provider(format!("request failed: {e}"), retryable)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err(FulfillmentError::provider(
                format!("provider returned {status}: {body}"),
                retryable,
            ));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| FulfillmentError::provider(format!("invalid response: {e}"), false))?;
        let url = session
            .url
            .ok_or_else(|| FulfillmentError::provider("session has no url", false))?;

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }
}

//! Hosted checkout sessions at the payment provider.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Money, PaymentMethod};

use crate::error::{FulfillmentError, Result};

/// Parameters of a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub order_id: OrderId,
    /// Charged amount; sent in integer minor units.
    pub amount: Money,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: String,
    pub payment_method: PaymentMethod,
    /// After this instant the session can no longer be paid.
    pub expires_at: DateTime<Utc>,
}

/// A session opened at the provider.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Trait for the external payment provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession>;
}

#[derive(Debug, Default)]
struct InMemoryProviderState {
    sessions: HashMap<String, CheckoutSessionRequest>,
    next_id: u32,
    fail_on_create: bool,
    delay: Option<Duration>,
}

/// In-memory payment provider for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentProvider {
    state: Arc<RwLock<InMemoryProviderState>>,
}

impl InMemoryPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the provider to reject session creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_create = fail;
    }

    /// Delays every session creation, to exercise timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).delay = delay;
    }

    pub fn session_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .len()
    }

    /// The request a session was opened with.
    pub fn request_for(&self, session_id: &str) -> Option<CheckoutSessionRequest> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions
            .get(session_id)
            .cloned()
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn create_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession> {
        let delay = self.state.read().unwrap_or_else(PoisonError::into_inner).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_create {
            return Err(FulfillmentError::provider("Session creation declined", false));
        }

        state.next_id += 1;
        let id = format!("cs_test_{:04}", state.next_id);
        state.sessions.insert(id.clone(), request.clone());

        Ok(CheckoutSession {
            url: format!("https://checkout.test/pay/{id}"),
            id,
        })
    }
}

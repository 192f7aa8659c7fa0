//! Order e-mail notifications.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use domain::Order;

use crate::error::{FulfillmentError, Result};

/// Trait for the e-mail capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()>;

    async fn send_delivery_notice(&self, order: &Order) -> Result<()>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        tracing::info!(order_id = %order.id, to = %order.contact_email, "order confirmation sent");
        Ok(())
    }

    async fn send_delivery_notice(&self, order: &Order) -> Result<()> {
        tracing::info!(order_id = %order.id, to = %order.contact_email, "delivery notice sent");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    OrderConfirmation,
    DeliveryNotice,
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<(NotificationKind, OrderId)>,
    fail: bool,
}

/// Notifier that records what it sent, for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every following send to fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).fail = fail;
    }

    /// Number of notifications of `kind` sent for `order_id`.
    pub fn sent_count(&self, kind: NotificationKind, order_id: OrderId) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .iter()
            .filter(|(k, id)| *k == kind && *id == order_id)
            .count()
    }

    pub fn total_sent(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).sent.len()
    }

    fn record(&self, kind: NotificationKind, order_id: OrderId) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(FulfillmentError::Notification("mail server unavailable".to_string()));
        }
        state.sent.push((kind, order_id));
        Ok(())
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        self.record(NotificationKind::OrderConfirmation, order.id)
    }

    async fn send_delivery_notice(&self, order: &Order) -> Result<()> {
        self.record(NotificationKind::DeliveryNotice, order.id)
    }
}

/// Awaits a notification with a deadline; failures are logged, never returned.
pub(crate) async fn send_bounded<F>(
    kind: NotificationKind,
    order_id: OrderId,
    timeout: Duration,
    send: F,
) where
    F: Future<Output = Result<()>>,
{
    match tokio::time::timeout(timeout, send).await {
        Ok(Ok(())) => {
            metrics::counter!("notifications_sent_total").increment(1);
        }
        Ok(Err(e)) => {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(%order_id, ?kind, error = %e, "notification failed");
        }
        Err(_) => {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(%order_id, ?kind, "notification timed out");
        }
    }
}

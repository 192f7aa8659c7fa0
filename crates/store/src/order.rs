//! Durable order storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{Order, OrderStatus};
use serde::Serialize;

use crate::Result;

/// Default page size for order listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size a listing will return.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Paged order listing filter. Pages are zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub page: u32,
    pub size: u32,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            status: None,
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl OrderQuery {
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn page(mut self, page: u32, size: u32) -> Self {
        self.page = page;
        self.size = size;
        self
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn limit(&self) -> u32 {
        self.size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.limit())
    }
}

/// One page of orders, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

/// Storage of orders with compare-and-set status changes.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Order>>;

    /// A user's orders, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    async fn list(&self, query: &OrderQuery) -> Result<OrderPage>;

    /// Records a provider session on a `Created` order.
    ///
    /// Only one payable session may exist per order: the write succeeds only
    /// when the order is `Created` and any earlier session has expired by
    /// `at`. Returns `false` otherwise; fails with `DuplicateSession` if
    /// another order holds the id.
    async fn attach_session(
        &self,
        id: OrderId,
        session_id: &str,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Moves the order to `to` iff its current status is one of `from`.
    ///
    /// Returns the updated order, or `None` when the order is missing or its
    /// status did not match. Entering `Delivered` stamps the delivery date.
    async fn transition(
        &self,
        id: OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>>;

    /// Deletes the order iff it is still in `status`, returning it.
    async fn delete_if_status(&self, id: OrderId, status: OrderStatus) -> Result<Option<Order>>;

    /// Orders in one of `statuses` last modified before `before`, oldest first.
    async fn find_stale(
        &self,
        statuses: &[OrderStatus],
        before: DateTime<Utc>,
    ) -> Result<Vec<Order>>;
}

/// Rejects `from → to` pairs the status machine does not allow.
pub(crate) fn check_transition(from: &[OrderStatus], to: OrderStatus) -> Result<()> {
    match from.iter().find(|status| !status.can_transition_to(to)) {
        Some(current) => Err(domain::OrderError::InvalidStateTransition {
            current: *current,
            action: to.as_str(),
        }
        .into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_clamps_page_size() {
        assert_eq!(OrderQuery::default().page(0, 0).limit(), 1);
        assert_eq!(OrderQuery::default().page(0, 1000).limit(), MAX_PAGE_SIZE);
        assert_eq!(OrderQuery::default().page(3, 10).offset(), 30);
    }

    #[test]
    fn illegal_transition_pairs_are_rejected() {
        assert!(check_transition(&[OrderStatus::Created], OrderStatus::Processing).is_ok());
        assert!(
            check_transition(
                &[OrderStatus::Created, OrderStatus::Processing],
                OrderStatus::Annulled
            )
            .is_ok()
        );
        assert!(check_transition(&[OrderStatus::Created], OrderStatus::Delivered).is_err());
    }
}

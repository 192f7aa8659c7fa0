//! The durable order record.

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{DeliveryTime, LineItem, OrderError, OrderStatus, PaymentMethod, ShippingAddress};
use crate::Money;

/// Days after the order date during which a delivered order can be refunded.
pub const RETURN_WINDOW_DAYS: i64 = 14;

/// Input for placing an order from a reserved cart.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub line_items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub delivery_time: DeliveryTime,
    pub shipping_price: Money,
    pub payment_method: PaymentMethod,
    pub contact_email: String,
}

/// An order placed from a cart snapshot.
///
/// `total_price` is the sum of the line totals at creation and never changes;
/// the amount charged adds `shipping_price` on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub line_items: Vec<LineItem>,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub delivery_time: DeliveryTime,
    pub shipping_price: Money,
    pub payment_method: PaymentMethod,
    pub contact_email: String,
    pub total_price: Money,
    pub session_id: Option<String>,
    pub session_expires_at: Option<DateTime<Utc>>,
    pub order_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub delivery_date: Option<DateTime<Utc>>,
}

impl Order {
    /// Builds a `Created` order, validating lines and address.
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.line_items.is_empty() {
            return Err(OrderError::NoLineItems);
        }
        for item in &new.line_items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.clone(),
                    price: item.unit_price.cents(),
                });
            }
        }
        new.shipping_address.validate()?;

        let total_price = new.line_items.iter().map(LineItem::total_price).sum();
        Ok(Self {
            id: OrderId::new(),
            user_id: new.user_id,
            line_items: new.line_items,
            status: OrderStatus::Created,
            shipping_address: new.shipping_address,
            delivery_time: new.delivery_time,
            shipping_price: new.shipping_price,
            payment_method: new.payment_method,
            contact_email: new.contact_email,
            total_price,
            session_id: None,
            session_expires_at: None,
            order_date: now,
            last_modified: now,
            delivery_date: None,
        })
    }

    /// Amount charged through the payment provider.
    pub fn amount_due(&self) -> Money {
        self.total_price + self.shipping_price
    }

    /// True while the stored payment session can still be paid.
    pub fn has_open_session(&self, now: DateTime<Utc>) -> bool {
        self.session_id.is_some() && self.session_expires_at.is_some_and(|at| at > now)
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// True while `now` is at most fourteen days after the order date.
    pub fn within_return_window(&self, now: DateTime<Utc>) -> bool {
        now - self.order_date <= Duration::days(RETURN_WINDOW_DAYS)
    }

    /// Checks that the order can be explicitly cancelled.
    pub fn ensure_cancellable(&self) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Created | OrderStatus::Processing => Ok(()),
            OrderStatus::Shipping | OrderStatus::Delivered => {
                Err(OrderError::PaymentAlreadyCompleted {
                    current: self.status,
                })
            }
            OrderStatus::Annulled | OrderStatus::Refunded => {
                Err(OrderError::InvalidStateTransition {
                    current: self.status,
                    action: "cancel",
                })
            }
        }
    }

    /// Checks status first, then the return window.
    pub fn ensure_refundable(&self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_refund() {
            return Err(OrderError::InvalidStateTransition {
                current: self.status,
                action: "refund",
            });
        }
        if !self.within_return_window(now) {
            return Err(OrderError::RefundWindowExpired {
                order_date: self.order_date,
            });
        }
        Ok(())
    }

    /// Applies a status change, stamping `last_modified` and the delivery date.
    pub fn transition(&mut self, to: OrderStatus, at: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidStateTransition {
                current: self.status,
                action: to.as_str(),
            });
        }
        self.status = to;
        self.last_modified = at;
        if to == OrderStatus::Delivered {
            self.delivery_date = Some(at);
        }
        Ok(())
    }
}

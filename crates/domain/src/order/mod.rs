//! Orders, line items and the order status state machine.

mod model;
mod status;
mod value_objects;

pub use model::{NewOrder, Order, RETURN_WINDOW_DAYS};
pub use status::{OrderStatus, UnknownStatus};
pub use value_objects::{DeliveryTime, LineItem, PaymentMethod, ShippingAddress};

use chrono::{DateTime, Utc};
use common::ProductId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// Order is not in a state that allows the requested action.
    #[error("Invalid order state: cannot {action} from {current} state")]
    InvalidStateTransition {
        current: OrderStatus,
        action: &'static str,
    },

    /// The order was already paid and has left processing.
    #[error("Payment already completed: order is {current}")]
    PaymentAlreadyCompleted { current: OrderStatus },

    /// Refund requested after the return window closed.
    #[error("Refund window expired for order placed at {order_date}")]
    RefundWindowExpired { order_date: DateTime<Utc> },

    /// Order has no line items.
    #[error("Order has no line items")]
    NoLineItems,

    /// Invalid quantity on a line.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// Negative unit price on a line.
    #[error("Invalid price for {product_id}: {price}")]
    InvalidPrice { product_id: ProductId, price: i64 },

    /// Shipping address is missing a required field.
    #[error("Shipping address is missing {field}")]
    IncompleteAddress { field: &'static str },
}

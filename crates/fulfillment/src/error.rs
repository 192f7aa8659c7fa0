//! Fulfillment error types.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{CartError, OrderError, OrderStatus};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur in the cart, order and payment services.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The product cannot take one more unit in this cart.
    #[error("Product out of stock: {0}")]
    OutOfStock(ProductId),

    /// A cart line exceeds the stock left.
    #[error("Insufficient stock for product: {0}")]
    InsufficientStock(ProductId),

    /// The cart is missing, empty or already reserved.
    #[error("Cart is empty")]
    EmptyCart,

    /// The cart is reserved for checkout and cannot be modified.
    #[error("Cart is locked for checkout")]
    CartLocked,

    /// The operation needs a reserved cart.
    #[error("Cart has no reserved stock")]
    CartNotReserved,

    /// The product does not exist in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The product is not in the cart.
    #[error("Product not in cart: {0}")]
    NotInCart(ProductId),

    /// The order does not exist or belongs to another user.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Caller lacks the admin role.
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    /// The order is not in a state that allows the requested action.
    #[error("Invalid order state: cannot {action} order in {current} state")]
    InvalidOrderState {
        current: OrderStatus,
        action: &'static str,
    },

    /// The order was paid and has left processing.
    #[error("Payment already completed: order is {0}")]
    PaymentAlreadyCompleted(OrderStatus),

    /// The order already has a payment session that can still be paid.
    #[error("Order {order_id} has an open payment session until {expires_at}")]
    PaymentSessionOpen {
        order_id: OrderId,
        expires_at: DateTime<Utc>,
    },

    /// Refund requested more than fourteen days after the order date.
    #[error("Refund window expired")]
    RefundWindowExpired,

    /// Order input rejected by the domain rules.
    #[error("Invalid order: {0}")]
    InvalidOrder(OrderError),

    /// The payment provider failed or timed out.
    #[error("Payment provider error: {message}")]
    PaymentProvider { message: String, retryable: bool },

    /// Webhook signature verification failed.
    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    /// Webhook body could not be understood.
    #[error("Invalid webhook payload: {0}")]
    InvalidWebhookPayload(String),

    /// A notification could not be delivered.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// No customer record for the user.
    #[error("Customer not found: {0}")]
    CustomerNotFound(UserId),

    /// Storage error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl FulfillmentError {
    /// Provider timeouts and 5xx responses may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FulfillmentError::PaymentProvider {
                retryable: true,
                ..
            }
        )
    }

    pub(crate) fn provider(message: impl Into<String>, retryable: bool) -> Self {
        FulfillmentError::PaymentProvider {
            message: message.into(),
            retryable,
        }
    }
}

impl From<OrderError> for FulfillmentError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidStateTransition { current, action } => {
                FulfillmentError::InvalidOrderState { current, action }
            }
            OrderError::PaymentAlreadyCompleted { current } => {
                FulfillmentError::PaymentAlreadyCompleted(current)
            }
            OrderError::RefundWindowExpired { .. } => FulfillmentError::RefundWindowExpired,
            other => FulfillmentError::InvalidOrder(other),
        }
    }
}

impl From<CartError> for FulfillmentError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::Locked => FulfillmentError::CartLocked,
            CartError::ItemNotFound { product_id } => FulfillmentError::NotInCart(product_id),
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_errors_map_to_taxonomy() {
        let err: FulfillmentError = OrderError::PaymentAlreadyCompleted {
            current: OrderStatus::Shipping,
        }
        .into();
        assert!(matches!(
            err,
            FulfillmentError::PaymentAlreadyCompleted(OrderStatus::Shipping)
        ));

        let err: FulfillmentError = OrderError::NoLineItems.into();
        assert!(matches!(err, FulfillmentError::InvalidOrder(_)));
    }

    #[test]
    fn only_provider_errors_are_retryable() {
        assert!(FulfillmentError::provider("timeout", true).is_retryable());
        assert!(!FulfillmentError::provider("card declined", false).is_retryable());
        assert!(!FulfillmentError::EmptyCart.is_retryable());
    }
}

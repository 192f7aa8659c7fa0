//! Domain layer for the order-fulfillment pipeline.
//!
//! This crate holds the pure business types shared by the stores and services:
//! - `Money` fixed-point amounts
//! - `Cart` with its checkout lock
//! - `Order`, its line items and the `OrderStatus` state machine

pub mod cart;
pub mod money;
pub mod order;

pub use cart::{Cart, CartError};
pub use money::Money;
pub use order::{
    DeliveryTime, LineItem, NewOrder, Order, OrderError, OrderStatus, PaymentMethod,
    ShippingAddress, UnknownStatus, RETURN_WINDOW_DAYS,
};

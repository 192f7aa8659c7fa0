//! Cart, order and payment services of the storefront.
//!
//! The [`CartService`] reserves stock for a cart, the [`OrderService`] owns
//! the order status machine, the [`PaymentOrchestrator`] ties both to the
//! hosted payment provider and its webhooks, and the [`Scheduler`] releases
//! abandoned reservations and advances paid orders.

pub mod caller;
pub mod cart_service;
pub mod clock;
pub mod error;
pub mod order_service;
pub mod payment;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod system;
pub mod webhook;

pub use caller::Caller;
pub use cart_service::{CartGuard, CartLine, CartService, CartView, ReservedCart};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FulfillmentError, Result};
pub use order_service::{LifecycleReport, OrderDetails, OrderService};
pub use payment::{
    CheckoutDetails, CheckoutSummary, PaymentOrchestrator, PaymentRedirect, ShippingOption,
    WebhookOutcome,
};
pub use scheduler::{
    AlwaysAdvance, LifecyclePolicy, RandomCarrierPolicy, Scheduler, SchedulerIntervals,
    SweepReport,
};
pub use settings::FulfillmentSettings;
pub use system::{Backends, FulfillmentSystem};
pub use webhook::{WebhookEvent, WebhookVerifier};

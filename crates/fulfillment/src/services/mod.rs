//! External collaborator traits and in-memory implementations.

pub mod accounts;
pub mod customers;
pub mod notifications;
pub mod payment_provider;
pub mod stripe;

pub use accounts::{AccountDirectory, Activation, ActivationKind, InMemoryAccountDirectory};
pub use customers::{Customer, CustomerDirectory, InMemoryCustomerDirectory};
pub use notifications::{InMemoryNotifier, LoggingNotifier, NotificationKind, Notifier};
pub use payment_provider::{
    CheckoutSession, CheckoutSessionRequest, InMemoryPaymentProvider, PaymentProvider,
};
pub use stripe::StripeClient;

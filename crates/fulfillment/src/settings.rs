//! Fulfillment tunables.

use chrono::Duration;
use common::OrderId;
use domain::{DeliveryTime, Money};

/// Timing windows, prices and endpoints used by the fulfillment services.
#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    /// Locked carts untouched for longer than this are released.
    pub reservation_ttl: Duration,
    /// Unpaid `Created` orders older than this are deleted and restocked.
    pub unpaid_order_ttl: Duration,
    /// How long a hosted checkout session stays payable.
    pub session_ttl: Duration,
    /// Paid orders advance one lifecycle step after this long unchanged.
    pub lifecycle_threshold: Duration,
    /// Chance the simulated carrier annuls an order instead of advancing it.
    pub annul_probability: f64,
    pub standard_shipping: Money,
    pub express_shipping: Money,
    /// ISO currency code sent to the payment provider.
    pub currency: String,
    /// Storefront base URL, ending with `/`.
    pub front_url: String,
    pub provider_timeout: std::time::Duration,
    pub notification_timeout: std::time::Duration,
    pub sweep_interval: std::time::Duration,
    pub lifecycle_interval: std::time::Duration,
    pub account_cleanup_interval: std::time::Duration,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::minutes(30),
            unpaid_order_ttl: Duration::hours(24),
            session_ttl: Duration::minutes(30),
            lifecycle_threshold: Duration::days(2),
            annul_probability: 1.0 / 13.0,
            standard_shipping: Money::from_cents(500),
            express_shipping: Money::from_cents(1500),
            currency: "eur".to_string(),
            front_url: "http://localhost:4200/".to_string(),
            provider_timeout: std::time::Duration::from_secs(10),
            notification_timeout: std::time::Duration::from_secs(5),
            sweep_interval: std::time::Duration::from_secs(60),
            lifecycle_interval: std::time::Duration::from_secs(3600),
            account_cleanup_interval: std::time::Duration::from_secs(86_400),
        }
    }
}

impl FulfillmentSettings {
    pub fn shipping_price(&self, delivery_time: DeliveryTime) -> Money {
        match delivery_time {
            DeliveryTime::Standard => self.standard_shipping,
            DeliveryTime::Express => self.express_shipping,
        }
    }

    pub fn success_url(&self, order_id: OrderId) -> String {
        format!("{}order?paid=true&orderId={}", self.front_url, order_id)
    }

    pub fn cancel_url(&self, order_id: OrderId) -> String {
        format!("{}order?paid=false&orderId={}", self.front_url, order_id)
    }
}

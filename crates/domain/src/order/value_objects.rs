//! Value objects for the order domain.

use common::ProductId;
use serde::{Deserialize, Serialize};

use super::OrderError;
use crate::Money;

/// A line item snapshotted from the cart at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Catalog price when the order was created.
    pub unit_price: Money,
}

impl LineItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns quantity × unit price.
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Destination of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub country: String,
    pub zip_code: String,
}

impl ShippingAddress {
    /// Rejects addresses with a blank field.
    pub fn validate(&self) -> Result<(), OrderError> {
        let fields = [
            ("address", &self.address),
            ("city", &self.city),
            ("country", &self.country),
            ("zipCode", &self.zip_code),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(OrderError::IncompleteAddress { field: *field }),
            None => Ok(()),
        }
    }
}

/// Shipping speed chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryTime {
    #[default]
    Standard,
    Express,
}

impl DeliveryTime {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryTime::Standard => "STANDARD",
            DeliveryTime::Express => "EXPRESS",
        }
    }
}

impl std::str::FromStr for DeliveryTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STANDARD" => Ok(DeliveryTime::Standard),
            "EXPRESS" => Ok(DeliveryTime::Express),
            other => Err(format!("unknown delivery time: {other}")),
        }
    }
}

/// Payment method type forwarded to the payment provider (e.g. `card`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    pub fn new(method: impl Into<String>) -> Self {
        Self(method.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self("card".to_string())
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            address: "Main St 1".to_string(),
            city: "Krakow".to_string(),
            country: "PL".to_string(),
            zip_code: "30-001".to_string(),
        }
    }

    #[test]
    fn line_total_multiplies_unit_price() {
        let item = LineItem::new("SKU-1", 3, Money::from_cents(250));
        assert_eq!(item.total_price(), Money::from_cents(750));
    }

    #[test]
    fn blank_address_field_is_rejected() {
        assert!(address().validate().is_ok());
        let mut missing_city = address();
        missing_city.city = "  ".to_string();
        assert_eq!(
            missing_city.validate(),
            Err(OrderError::IncompleteAddress { field: "city" })
        );
    }

    #[test]
    fn delivery_time_parses_case_insensitively() {
        assert_eq!("express".parse::<DeliveryTime>().unwrap(), DeliveryTime::Express);
        assert!("overnight".parse::<DeliveryTime>().is_err());
    }
}

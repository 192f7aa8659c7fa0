//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► Processing ──► Shipping ──► Delivered ──► Refunded
///    │            │             │
///    └────────────┴─────────────┴──► Annulled
/// ```
///
/// `Shipping ──► Annulled` is only taken by the lifecycle simulation; explicit
/// cancellation is limited to `Created` and `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Stock reserved, awaiting payment.
    #[default]
    Created,

    /// Payment confirmed.
    Processing,

    /// Handed to the carrier.
    Shipping,

    /// Delivered to the customer.
    Delivered,

    /// Cancelled; reserved stock was released (terminal state).
    Annulled,

    /// Refunded after delivery (terminal state).
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Created,
        OrderStatus::Processing,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
        OrderStatus::Annulled,
        OrderStatus::Refunded,
    ];

    /// Returns true if a payment confirmation can move the order forward.
    pub fn can_confirm_payment(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    /// Returns true if the order can be cancelled by a user or admin.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::Processing)
    }

    /// Returns true if the order can be refunded (ignoring the return window).
    pub fn can_refund(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns true once payment has been received.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Processing | OrderStatus::Shipping | OrderStatus::Delivered
        )
    }

    /// Returns true if this is a terminal state for the order.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Annulled | OrderStatus::Refunded
        )
    }

    /// The next step of the carrier lifecycle, if any.
    pub fn next_in_lifecycle(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Processing => Some(OrderStatus::Shipping),
            OrderStatus::Shipping => Some(OrderStatus::Delivered),
            _ => None,
        }
    }

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Processing)
                | (Created, Annulled)
                | (Processing, Shipping)
                | (Processing, Annulled)
                | (Shipping, Delivered)
                | (Shipping, Annulled)
                | (Delivered, Refunded)
        )
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipping => "SHIPPING",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Annulled => "ANNULLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_created() {
        assert_eq!(OrderStatus::default(), OrderStatus::Created);
    }

    #[test]
    fn test_only_created_confirms_payment() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.can_confirm_payment(),
                status == OrderStatus::Created,
                "{status}"
            );
        }
    }

    #[test]
    fn test_cancel_allowed_before_shipping() {
        assert!(OrderStatus::Created.can_cancel());
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Shipping.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Annulled.can_cancel());
        assert!(!OrderStatus::Refunded.can_cancel());
    }

    #[test]
    fn test_lifecycle_steps() {
        assert_eq!(
            OrderStatus::Processing.next_in_lifecycle(),
            Some(OrderStatus::Shipping)
        );
        assert_eq!(
            OrderStatus::Shipping.next_in_lifecycle(),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(OrderStatus::Created.next_in_lifecycle(), None);
        assert_eq!(OrderStatus::Delivered.next_in_lifecycle(), None);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Shipping));
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Annulled.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Refunded.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Annulled));
    }

    #[test]
    fn test_terminal_statuses_have_no_forward_step() {
        for status in [OrderStatus::Annulled, OrderStatus::Refunded] {
            assert!(status.is_terminal());
            assert!(
                OrderStatus::ALL
                    .into_iter()
                    .all(|next| !status.can_transition_to(next))
            );
        }
    }

    #[test]
    fn test_parse_round_trips_names() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!("processing".parse::<OrderStatus>().unwrap(), OrderStatus::Processing);
        assert!("PAID".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serializes_screaming_case() {
        let json = serde_json::to_string(&OrderStatus::Annulled).unwrap();
        assert_eq!(json, "\"ANNULLED\"");
    }
}

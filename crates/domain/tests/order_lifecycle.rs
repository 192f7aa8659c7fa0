//! Integration tests for the order record and its status machine.

use chrono::{Duration, Utc};
use common::UserId;
use domain::{
    Cart, CartError, DeliveryTime, LineItem, Money, NewOrder, Order, OrderError, OrderStatus,
    PaymentMethod, ShippingAddress,
};

fn address() -> ShippingAddress {
    ShippingAddress {
        address: "Main St 1".to_string(),
        city: "Krakow".to_string(),
        country: "PL".to_string(),
        zip_code: "30-001".to_string(),
    }
}

fn order_from(cart: &Cart, price_of: impl Fn(&str) -> i64) -> Order {
    let line_items = cart
        .lines()
        .map(|(id, qty)| LineItem::new(id.clone(), qty, Money::from_cents(price_of(id.as_str()))))
        .collect();
    Order::place(
        NewOrder {
            user_id: cart.user_id(),
            line_items,
            shipping_address: address(),
            delivery_time: DeliveryTime::Standard,
            shipping_price: Money::from_cents(500),
            payment_method: PaymentMethod::new("card"),
            contact_email: "buyer@example.com".to_string(),
        },
        Utc::now(),
    )
    .unwrap()
}

mod order_lifecycle {
    use super::*;

    #[test]
    fn cart_snapshot_to_refund() {
        let now = Utc::now();
        let mut cart = Cart::new(UserId::new(), now);
        cart.add_one("A".into(), now).unwrap();
        cart.add_one("A".into(), now).unwrap();
        cart.add_one("B".into(), now).unwrap();
        cart.lock(now);

        let mut order = order_from(&cart, |id| if id == "A" { 1200 } else { 300 });
        assert_eq!(order.total_price.cents(), 2 * 1200 + 300);
        assert_eq!(order.amount_due().cents(), 2 * 1200 + 300 + 500);

        let later = order.order_date + Duration::days(1);
        for next in [
            OrderStatus::Processing,
            OrderStatus::Shipping,
            OrderStatus::Delivered,
        ] {
            order.transition(next, later).unwrap();
        }
        order.ensure_refundable(later).unwrap();
        order.transition(OrderStatus::Refunded, later).unwrap();
        assert!(order.status.is_terminal());
    }

    #[test]
    fn cancelled_order_cannot_be_paid() {
        let now = Utc::now();
        let mut cart = Cart::new(UserId::new(), now);
        cart.add_one("A".into(), now).unwrap();
        let mut order = order_from(&cart, |_| 100);

        order.ensure_cancellable().unwrap();
        order.transition(OrderStatus::Annulled, now).unwrap();

        assert!(!order.status.can_confirm_payment());
        assert_eq!(
            order.transition(OrderStatus::Processing, now),
            Err(OrderError::InvalidStateTransition {
                current: OrderStatus::Annulled,
                action: "PROCESSING",
            })
        );
    }
}

mod cart_lock {
    use super::*;

    #[test]
    fn locked_cart_keeps_its_snapshot() {
        let now = Utc::now();
        let mut cart = Cart::new(UserId::new(), now);
        cart.add_one("A".into(), now).unwrap();
        cart.lock(now);

        assert_eq!(cart.add_one("B".into(), now), Err(CartError::Locked));
        let order = order_from(&cart, |_| 999);
        assert_eq!(order.line_items.len(), 1);
        assert_eq!(order.line_items[0].quantity, 1);
    }
}

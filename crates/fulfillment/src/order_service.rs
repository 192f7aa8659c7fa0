//! Order creation, queries and status transitions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{
    Cart, DeliveryTime, LineItem, NewOrder, Order, OrderStatus, PaymentMethod, ShippingAddress,
};
use serde::{Deserialize, Serialize};
use store::{InventoryStore, OrderPage, OrderQuery, OrderStore, Product, StoreError};

use crate::caller::Caller;
use crate::clock::Clock;
use crate::error::{FulfillmentError, Result};
use crate::scheduler::LifecyclePolicy;
use crate::services::notifications::{send_bounded, NotificationKind, Notifier};
use crate::settings::FulfillmentSettings;

/// Delivery and payment choices made at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub delivery_time: DeliveryTime,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub contact_email: String,
}

/// Counts from one lifecycle advancement run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    pub shipped: usize,
    pub delivered: usize,
    pub annulled: usize,
}

impl LifecycleReport {
    pub fn total(&self) -> usize {
        self.shipped + self.delivered + self.annulled
    }
}

/// Owns every order status change.
///
/// All transitions go through the store's compare-and-set, so a webhook, a
/// cancellation and a sweep racing on one order produce exactly one winner.
/// Only the winner touches stock, counters or notifications.
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: FulfillmentSettings,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: FulfillmentSettings,
    ) -> Self {
        Self {
            orders,
            inventory,
            notifier,
            clock,
            settings,
        }
    }

    /// Persists a `Created` order from a reserved cart.
    ///
    /// Lines are priced from `products`, the catalog snapshot taken at
    /// reservation time.
    #[tracing::instrument(skip(self, cart, products, details), fields(user_id = %cart.user_id()))]
    pub async fn create_order(
        &self,
        cart: &Cart,
        products: &[Product],
        details: OrderDetails,
    ) -> Result<Order> {
        if !cart.is_locked() {
            return Err(FulfillmentError::CartNotReserved);
        }

        let prices: HashMap<&ProductId, &Product> = products.iter().map(|p| (&p.id, p)).collect();
        let line_items = cart
            .lines()
            .map(|(id, quantity)| {
                prices
                    .get(id)
                    .map(|p| LineItem::new(id.clone(), quantity, p.price))
                    .ok_or_else(|| FulfillmentError::ProductNotFound(id.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let order = Order::place(
            NewOrder {
                user_id: cart.user_id(),
                line_items,
                shipping_address: details.shipping_address,
                delivery_time: details.delivery_time,
                shipping_price: self.settings.shipping_price(details.delivery_time),
                payment_method: details.payment_method,
                contact_email: details.contact_email,
            },
            self.clock.now(),
        )?;
        self.orders.insert(&order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total_price, "order created");
        Ok(order)
    }

    /// Fetches an order the caller may see. Other users' orders are
    /// reported as missing.
    pub async fn get_order(&self, caller: Caller, id: OrderId) -> Result<Order> {
        match self.orders.get(id).await? {
            Some(order) if caller.can_access(order.user_id) => Ok(order),
            _ => Err(FulfillmentError::OrderNotFound(id)),
        }
    }

    pub async fn find_by_session(&self, session_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.find_by_session(session_id).await?)
    }

    /// The user's orders, newest first.
    pub async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.orders.list_for_user(user_id).await?)
    }

    /// Pages through all orders. Admin only.
    pub async fn list_orders(&self, caller: Caller, query: &OrderQuery) -> Result<OrderPage> {
        if !caller.is_admin {
            return Err(FulfillmentError::Forbidden("listing all orders requires admin"));
        }
        Ok(self.orders.list(query).await?)
    }

    /// Records the provider session on a `Created` order.
    ///
    /// An earlier session is only replaced after it expired, so the order
    /// never has two payable sessions.
    pub async fn attach_session(
        &self,
        id: OrderId,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let now = self.clock.now();
        if self
            .orders
            .attach_session(id, session_id, expires_at, now)
            .await?
        {
            return Ok(());
        }
        let current = self.reload(id).await?;
        Err(pay_refusal(&current, now))
    }

    /// Deletes an order that never got paid, without touching stock.
    ///
    /// Used when checkout fails after the order was written; the stock is
    /// still held by the cart and released there.
    pub async fn discard_unpaid(&self, id: OrderId) -> Result<bool> {
        Ok(self
            .orders
            .delete_if_status(id, OrderStatus::Created)
            .await?
            .is_some())
    }

    /// Cancels a `Created` or `Processing` order and returns its stock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, caller: Caller, id: OrderId) -> Result<Order> {
        let order = self.get_order(caller, id).await?;
        order.ensure_cancellable()?;

        let Some(annulled) = self
            .orders
            .transition(
                id,
                &[OrderStatus::Created, OrderStatus::Processing],
                OrderStatus::Annulled,
                self.clock.now(),
            )
            .await?
        else {
            // Lost the race; report against the state that won.
            let current = self.reload(id).await?;
            current.ensure_cancellable()?;
            return Err(FulfillmentError::InvalidOrderState {
                current: current.status,
                action: "cancel",
            });
        };

        self.release_items(&annulled).await?;
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(order_id = %id, admin = caller.is_admin, "order cancelled");
        Ok(annulled)
    }

    /// Refunds a delivered order inside the return window and restocks it.
    #[tracing::instrument(skip(self))]
    pub async fn refund_order(&self, caller: Caller, id: OrderId) -> Result<Order> {
        let order = self.get_order(caller, id).await?;
        order.ensure_refundable(self.clock.now())?;

        let Some(refunded) = self
            .orders
            .transition(
                id,
                &[OrderStatus::Delivered],
                OrderStatus::Refunded,
                self.clock.now(),
            )
            .await?
        else {
            let current = self.current_status(id).await?;
            return Err(FulfillmentError::InvalidOrderState {
                current,
                action: "refund",
            });
        };

        self.release_items(&refunded).await?;
        metrics::counter!("orders_refunded_total").increment(1);
        tracing::info!(order_id = %id, "order refunded");
        Ok(refunded)
    }

    /// Moves a `Created` order to `Processing` after payment.
    ///
    /// Returns the order only when this call performed the transition; the
    /// caller that wins bumps the sold counters and sends the confirmation.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, id: OrderId) -> Result<Option<Order>> {
        let Some(order) = self
            .orders
            .transition(
                id,
                &[OrderStatus::Created],
                OrderStatus::Processing,
                self.clock.now(),
            )
            .await?
        else {
            return Ok(None);
        };

        for item in &order.line_items {
            if let Err(e) = self
                .inventory
                .increment_sold(&item.product_id, item.quantity)
                .await
            {
                tracing::error!(
                    order_id = %id,
                    product_id = %item.product_id,
                    error = %e,
                    "sold counter not updated"
                );
            }
        }

        send_bounded(
            NotificationKind::OrderConfirmation,
            id,
            self.settings.notification_timeout,
            self.notifier.send_order_confirmation(&order),
        )
        .await;

        metrics::counter!("orders_paid_total").increment(1);
        tracing::info!(order_id = %id, "payment confirmed");
        Ok(Some(order))
    }

    /// Deletes `Created` orders left unpaid past the unpaid-order window and
    /// returns their stock.
    #[tracing::instrument(skip(self))]
    pub async fn expire_unpaid_orders(&self) -> Result<usize> {
        let cutoff = self.clock.now() - self.settings.unpaid_order_ttl;
        let stale = self
            .orders
            .find_stale(&[OrderStatus::Created], cutoff)
            .await?;

        let mut expired = 0;
        for order in stale {
            // A payment may have landed since the scan.
            let Some(deleted) = self
                .orders
                .delete_if_status(order.id, OrderStatus::Created)
                .await?
            else {
                continue;
            };
            if let Err(e) = self.release_items(&deleted).await {
                tracing::error!(
                    order_id = %deleted.id,
                    error = %e,
                    "stock of expired order not released"
                );
                continue;
            }
            expired += 1;
        }

        if expired > 0 {
            metrics::counter!("orders_expired_total").increment(expired as u64);
            tracing::info!(expired, "unpaid orders expired");
        }
        Ok(expired)
    }

    /// Advances paid orders unchanged for longer than the lifecycle
    /// threshold by one step chosen by `policy`.
    #[tracing::instrument(skip(self, policy))]
    pub async fn advance_lifecycle(&self, policy: &dyn LifecyclePolicy) -> Result<LifecycleReport> {
        let cutoff = self.clock.now() - self.settings.lifecycle_threshold;
        let stale = self
            .orders
            .find_stale(&[OrderStatus::Processing, OrderStatus::Shipping], cutoff)
            .await?;

        let mut report = LifecycleReport::default();
        for order in stale {
            let Some(next) = policy.next_status(order.status) else {
                continue;
            };
            let Some(updated) = self
                .orders
                .transition(order.id, &[order.status], next, self.clock.now())
                .await?
            else {
                continue;
            };

            match next {
                OrderStatus::Shipping => report.shipped += 1,
                OrderStatus::Delivered => {
                    report.delivered += 1;
                    send_bounded(
                        NotificationKind::DeliveryNotice,
                        updated.id,
                        self.settings.notification_timeout,
                        self.notifier.send_delivery_notice(&updated),
                    )
                    .await;
                }
                OrderStatus::Annulled => {
                    report.annulled += 1;
                    if let Err(e) = self.release_items(&updated).await {
                        tracing::error!(
                            order_id = %updated.id,
                            error = %e,
                            "stock of annulled order not released"
                        );
                    }
                }
                _ => {}
            }
            tracing::debug!(order_id = %updated.id, status = %next, "order advanced");
        }
        Ok(report)
    }

    async fn reload(&self, id: OrderId) -> Result<Order> {
        self.orders
            .get(id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(id))
    }

    async fn current_status(&self, id: OrderId) -> Result<OrderStatus> {
        Ok(self.reload(id).await?.status)
    }

    /// Returns every line to stock, attempting all lines.
    async fn release_items(&self, order: &Order) -> Result<()> {
        let mut first_error: Option<StoreError> = None;
        for item in &order.line_items {
            if let Err(e) = self.inventory.release(&item.product_id, item.quantity).await {
                tracing::error!(
                    order_id = %order.id,
                    product_id = %item.product_id,
                    error = %e,
                    "stock release failed"
                );
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Why a new payment session cannot be opened for `order`.
pub(crate) fn pay_refusal(order: &Order, now: DateTime<Utc>) -> FulfillmentError {
    match order.session_expires_at {
        Some(expires_at) if order.status == OrderStatus::Created && order.has_open_session(now) => {
            FulfillmentError::PaymentSessionOpen {
                order_id: order.id,
                expires_at,
            }
        }
        _ => FulfillmentError::InvalidOrderState {
            current: order.status,
            action: "pay",
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use domain::Money;
    use store::{InMemoryInventory, InMemoryOrderStore};

    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduler::AlwaysAdvance;
    use crate::services::InMemoryNotifier;

    struct Harness {
        service: OrderService,
        inventory: InMemoryInventory,
        orders: InMemoryOrderStore,
        notifier: InMemoryNotifier,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let inventory = InMemoryInventory::with_products([
            Product::new("A", "Ball", Money::from_cents(1200), 0),
            Product::new("B", "Racket", Money::from_cents(300), 4),
        ]);
        let orders = InMemoryOrderStore::new();
        let notifier = InMemoryNotifier::new();
        let clock = ManualClock::new(Utc::now());
        let service = OrderService::new(
            Arc::new(orders.clone()),
            Arc::new(inventory.clone()),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
            FulfillmentSettings::default(),
        );
        Harness {
            service,
            inventory,
            orders,
            notifier,
            clock,
        }
    }

    fn details() -> OrderDetails {
        OrderDetails {
            shipping_address: ShippingAddress {
                address: "1 Main St".to_string(),
                city: "Lisbon".to_string(),
                country: "PT".to_string(),
                zip_code: "1000-001".to_string(),
            },
            delivery_time: DeliveryTime::Express,
            payment_method: PaymentMethod::default(),
            contact_email: "shopper@example.com".to_string(),
        }
    }

    async fn place(h: &Harness, user: UserId) -> Order {
        let mut cart = Cart::new(user, h.clock.now());
        cart.add_one("A".into(), h.clock.now()).unwrap();
        cart.add_one("A".into(), h.clock.now()).unwrap();
        cart.add_one("B".into(), h.clock.now()).unwrap();
        cart.lock(h.clock.now());
        let products = vec![
            Product::new("A", "Ball", Money::from_cents(1200), 0),
            Product::new("B", "Racket", Money::from_cents(300), 4),
        ];
        h.service.create_order(&cart, &products, details()).await.unwrap()
    }

    async fn stock(h: &Harness, id: &str) -> u32 {
        h.inventory
            .amount_left(&ProductId::new(id))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn create_order_snapshots_prices_and_shipping() {
        let h = harness();
        let order = place(&h, UserId::new()).await;

        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.total_price, Money::from_cents(2 * 1200 + 300));
        assert_eq!(order.shipping_price, Money::from_cents(1500));
        assert_eq!(order.amount_due(), Money::from_cents(4200));
        assert_eq!(h.orders.order_count().await, 1);
    }

    #[tokio::test]
    async fn create_order_requires_reserved_cart() {
        let h = harness();
        let mut cart = Cart::new(UserId::new(), h.clock.now());
        cart.add_one("B".into(), h.clock.now()).unwrap();

        let err = h.service.create_order(&cart, &[], details()).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::CartNotReserved));
    }

    #[tokio::test]
    async fn cancel_releases_stock_once() {
        let h = harness();
        let user = UserId::new();
        let order = place(&h, user).await;

        let annulled = h.service.cancel_order(Caller::user(user), order.id).await.unwrap();
        assert_eq!(annulled.status, OrderStatus::Annulled);
        assert_eq!(stock(&h, "A").await, 2);
        assert_eq!(stock(&h, "B").await, 5);

        let err = h
            .service
            .cancel_order(Caller::user(user), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::InvalidOrderState { .. }));
        assert_eq!(stock(&h, "A").await, 2);
    }

    #[tokio::test]
    async fn users_cannot_touch_other_users_orders() {
        let h = harness();
        let order = place(&h, UserId::new()).await;
        let stranger = Caller::user(UserId::new());

        assert!(matches!(
            h.service.get_order(stranger, order.id).await,
            Err(FulfillmentError::OrderNotFound(_))
        ));
        assert!(matches!(
            h.service.cancel_order(stranger, order.id).await,
            Err(FulfillmentError::OrderNotFound(_))
        ));
        assert!(matches!(
            h.service.list_orders(stranger, &OrderQuery::default()).await,
            Err(FulfillmentError::Forbidden(_))
        ));

        let admin = Caller::admin(UserId::new());
        assert!(h.service.cancel_order(admin, order.id).await.is_ok());
    }

    #[tokio::test]
    async fn confirm_payment_wins_once() {
        let h = harness();
        let order = place(&h, UserId::new()).await;

        assert!(h.service.confirm_payment(order.id).await.unwrap().is_some());
        assert!(h.service.confirm_payment(order.id).await.unwrap().is_none());

        let sold = h.inventory.orders_sold(&ProductId::new("A")).await.unwrap();
        assert_eq!(sold, Some(2));
        assert_eq!(
            h.notifier
                .sent_count(NotificationKind::OrderConfirmation, order.id),
            1
        );
    }

    #[tokio::test]
    async fn paid_order_past_processing_cannot_be_cancelled() {
        let h = harness();
        let user = UserId::new();
        let order = place(&h, user).await;
        h.service.confirm_payment(order.id).await.unwrap();
        h.clock.advance(Duration::days(3));
        h.service.advance_lifecycle(&AlwaysAdvance).await.unwrap();

        let err = h
            .service
            .cancel_order(Caller::user(user), order.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::PaymentAlreadyCompleted(OrderStatus::Shipping)
        ));
    }

    #[tokio::test]
    async fn lifecycle_delivers_and_notifies() {
        let h = harness();
        let order = place(&h, UserId::new()).await;
        h.service.confirm_payment(order.id).await.unwrap();

        h.clock.advance(Duration::days(1));
        let report = h.service.advance_lifecycle(&AlwaysAdvance).await.unwrap();
        assert_eq!(report.total(), 0);

        h.clock.advance(Duration::days(2));
        let report = h.service.advance_lifecycle(&AlwaysAdvance).await.unwrap();
        assert_eq!(report.shipped, 1);

        h.clock.advance(Duration::days(3));
        let report = h.service.advance_lifecycle(&AlwaysAdvance).await.unwrap();
        assert_eq!(report.delivered, 1);

        let delivered = h.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert_eq!(delivered.delivery_date, Some(h.clock.now()));
        assert_eq!(
            h.notifier.sent_count(NotificationKind::DeliveryNotice, order.id),
            1
        );
    }

    #[tokio::test]
    async fn unpaid_orders_expire_and_restock() {
        let h = harness();
        let order = place(&h, UserId::new()).await;

        h.clock.advance(Duration::hours(23));
        assert_eq!(h.service.expire_unpaid_orders().await.unwrap(), 0);

        h.clock.advance(Duration::hours(2));
        assert_eq!(h.service.expire_unpaid_orders().await.unwrap(), 1);
        assert!(h.orders.get(order.id).await.unwrap().is_none());
        assert_eq!(stock(&h, "A").await, 2);
        assert_eq!(stock(&h, "B").await, 5);
    }

    #[tokio::test]
    async fn attach_session_only_while_created() {
        let h = harness();
        let order = place(&h, UserId::new()).await;
        let expires = h.clock.now() + Duration::minutes(30);
        h.service.attach_session(order.id, "cs_1", expires).await.unwrap();
        assert!(matches!(
            h.service.attach_session(order.id, "cs_2", expires).await,
            Err(FulfillmentError::PaymentSessionOpen { .. })
        ));
        assert!(h.service.find_by_session("cs_1").await.unwrap().is_some());

        h.clock.advance(Duration::minutes(30));
        let expires = h.clock.now() + Duration::minutes(30);
        h.service.attach_session(order.id, "cs_2", expires).await.unwrap();
        assert!(h.service.find_by_session("cs_1").await.unwrap().is_none());

        h.service.confirm_payment(order.id).await.unwrap();
        assert!(matches!(
            h.service.attach_session(order.id, "cs_3", expires).await,
            Err(FulfillmentError::InvalidOrderState {
                current: OrderStatus::Processing,
                ..
            })
        ));
    }
}

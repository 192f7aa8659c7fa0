//! Checkout, hosted payment sessions and provider webhooks.

use std::sync::Arc;
use std::time::Instant;

use common::{OrderId, UserId};
use domain::{Cart, DeliveryTime, Money, Order, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::caller::Caller;
use crate::cart_service::{CartGuard, CartService, CartView};
use crate::clock::Clock;
use crate::error::{FulfillmentError, Result};
use crate::order_service::{pay_refusal, OrderDetails, OrderService};
use crate::services::{
    CheckoutSession, CheckoutSessionRequest, Customer, CustomerDirectory, PaymentProvider,
};
use crate::settings::FulfillmentSettings;
use crate::webhook::{parse_event, WebhookEvent, WebhookVerifier};

/// Checkout input: who is paying and where the parcel goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDetails {
    pub first_name: String,
    pub last_name: String,
    #[serde(flatten)]
    pub order: OrderDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingOption {
    pub delivery_time: DeliveryTime,
    pub price: Money,
}

/// What the checkout page shows after the cart has been reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSummary {
    pub cart: CartView,
    pub shipping_options: Vec<ShippingOption>,
    pub customer: Option<Customer>,
}

/// Where to send the shopper to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRedirect {
    pub order_id: OrderId,
    pub session_id: String,
    pub url: String,
}

/// Result of processing one webhook delivery.
///
/// Every variant is acknowledged to the provider; only storage failures
/// surface as errors so the provider retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Confirmed { order_id: OrderId },
    Duplicate { order_id: OrderId },
    Ignored { event_type: String },
    Rejected { reason: String },
    UnknownSession { session_id: String },
}

impl WebhookOutcome {
    fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Confirmed { .. } => "confirmed",
            WebhookOutcome::Duplicate { .. } => "duplicate",
            WebhookOutcome::Ignored { .. } => "ignored",
            WebhookOutcome::Rejected { .. } => "rejected",
            WebhookOutcome::UnknownSession { .. } => "unknown_session",
        }
    }
}

/// Drives the cart → order → payment flow.
pub struct PaymentOrchestrator {
    carts: Arc<CartService>,
    orders: Arc<OrderService>,
    customers: Arc<dyn CustomerDirectory>,
    provider: Arc<dyn PaymentProvider>,
    verifier: WebhookVerifier,
    clock: Arc<dyn Clock>,
    settings: FulfillmentSettings,
}

impl PaymentOrchestrator {
    pub fn new(
        carts: Arc<CartService>,
        orders: Arc<OrderService>,
        customers: Arc<dyn CustomerDirectory>,
        provider: Arc<dyn PaymentProvider>,
        verifier: WebhookVerifier,
        clock: Arc<dyn Clock>,
        settings: FulfillmentSettings,
    ) -> Self {
        Self {
            carts,
            orders,
            customers,
            provider,
            verifier,
            clock,
            settings,
        }
    }

    /// Reserves the cart if needed and returns totals, shipping options and
    /// the customer's saved details.
    #[tracing::instrument(skip(self))]
    pub async fn summary(&self, user_id: UserId) -> Result<CheckoutSummary> {
        {
            let guard = self.carts.lock(user_id).await;
            self.carts.ensure_reserved(&guard).await?;
        }

        let cart = self.carts.view_cart(user_id).await?;
        let customer = self.customers.find(user_id).await?;
        let shipping_options = [DeliveryTime::Standard, DeliveryTime::Express]
            .into_iter()
            .map(|delivery_time| ShippingOption {
                delivery_time,
                price: self.settings.shipping_price(delivery_time),
            })
            .collect();

        Ok(CheckoutSummary {
            cart,
            shipping_options,
            customer,
        })
    }

    /// Turns the user's cart into an order and opens a payment session.
    ///
    /// On success the cart is deleted; the order now holds the reserved
    /// stock. On any failure the order is discarded, the stock released and
    /// the cart left unlocked.
    #[tracing::instrument(skip(self, details))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        details: CheckoutDetails,
    ) -> Result<PaymentRedirect> {
        let started = Instant::now();
        details.order.shipping_address.validate()?;
        self.customers
            .save(&Customer {
                user_id,
                first_name: details.first_name,
                last_name: details.last_name,
                email: details.order.contact_email.clone(),
                shipping_address: Some(details.order.shipping_address.clone()),
            })
            .await?;

        let guard = self.carts.lock(user_id).await;
        let reserved = self.carts.ensure_reserved(&guard).await?;

        let order = match self
            .orders
            .create_order(&reserved.cart, &reserved.products, details.order)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                self.abort_checkout(&guard, None).await;
                metrics::counter!("checkouts_total", "outcome" => "failed").increment(1);
                return Err(e);
            }
        };

        let session = match self.open_session(&order).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    order_id = %order.id,
                    error = %e,
                    "payment session failed, rolling back"
                );
                self.abort_checkout(&guard, Some(order.id)).await;
                metrics::counter!("checkouts_total", "outcome" => "failed").increment(1);
                return Err(e);
            }
        };

        // The order owns the stock from here on. A locked cart left behind
        // would be released again by the reservation sweep.
        if let Err(e) = self.carts.delete_locked(&guard).await {
            tracing::error!(
                order_id = %order.id,
                error = %e,
                "cart not deleted after checkout, rolling back"
            );
            self.abort_checkout(&guard, Some(order.id)).await;
            metrics::counter!("checkouts_total", "outcome" => "failed").increment(1);
            return Err(e);
        }

        metrics::counter!("checkouts_total", "outcome" => "completed").increment(1);
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(order_id = %order.id, session_id = %session.id, "checkout completed");
        Ok(PaymentRedirect {
            order_id: order.id,
            session_id: session.id,
            url: session.url,
        })
    }

    /// Opens a fresh session for an unpaid order.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment_session(
        &self,
        caller: Caller,
        order_id: OrderId,
    ) -> Result<PaymentRedirect> {
        let order = self.orders.get_order(caller, order_id).await?;
        let now = self.clock.now();
        if order.status != OrderStatus::Created || order.has_open_session(now) {
            return Err(pay_refusal(&order, now));
        }

        let session = self.open_session(&order).await?;
        Ok(PaymentRedirect {
            order_id,
            session_id: session.id,
            url: session.url,
        })
    }

    /// Releases the user's reserved cart without checking out.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_payment(&self, user_id: UserId) -> Result<Cart> {
        self.carts.release_and_unlock(user_id).await
    }

    /// Processes a provider webhook delivery.
    ///
    /// The signature is checked before the body is parsed. Duplicate
    /// deliveries of a completed payment are no-ops.
    #[tracing::instrument(skip(self, payload, signature), fields(bytes = payload.len()))]
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let outcome = self.process_webhook(payload, signature).await?;
        metrics::counter!("webhook_events_total", "outcome" => outcome.label()).increment(1);
        match &outcome {
            WebhookOutcome::Rejected { reason } => tracing::warn!(%reason, "webhook rejected"),
            WebhookOutcome::UnknownSession { session_id } => {
                tracing::warn!(%session_id, "webhook for unknown session")
            }
            other => tracing::debug!(outcome = ?other, "webhook processed"),
        }
        Ok(outcome)
    }

    async fn process_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let Some(signature) = signature else {
            return Ok(WebhookOutcome::Rejected {
                reason: "missing signature header".to_string(),
            });
        };
        if let Err(e) = self.verifier.verify(payload, signature, self.clock.now()) {
            return Ok(WebhookOutcome::Rejected {
                reason: e.to_string(),
            });
        }

        let session_id = match parse_event(payload) {
            Ok(WebhookEvent::CheckoutCompleted { session_id }) => session_id,
            Ok(WebhookEvent::Other { event_type }) => {
                return Ok(WebhookOutcome::Ignored { event_type });
            }
            Err(e) => {
                return Ok(WebhookOutcome::Rejected {
                    reason: e.to_string(),
                });
            }
        };

        let Some(order) = self.orders.find_by_session(&session_id).await? else {
            return Ok(WebhookOutcome::UnknownSession { session_id });
        };

        match self.orders.confirm_payment(order.id).await? {
            Some(_) => Ok(WebhookOutcome::Confirmed { order_id: order.id }),
            None => {
                if order.status == OrderStatus::Annulled {
                    tracing::warn!(order_id = %order.id, "payment completed for annulled order");
                }
                Ok(WebhookOutcome::Duplicate { order_id: order.id })
            }
        }
    }

    /// Creates a provider session bounded by the provider timeout and
    /// stores its id on the order.
    async fn open_session(&self, order: &Order) -> Result<CheckoutSession> {
        let expires_at = self.clock.now() + self.settings.session_ttl;
        let request = CheckoutSessionRequest {
            order_id: order.id,
            amount: order.amount_due(),
            currency: self.settings.currency.clone(),
            success_url: self.settings.success_url(order.id),
            cancel_url: self.settings.cancel_url(order.id),
            customer_email: order.contact_email.clone(),
            payment_method: order.payment_method.clone(),
            expires_at,
        };

        let started = Instant::now();
        let session = tokio::time::timeout(
            self.settings.provider_timeout,
            self.provider.create_session(&request),
        )
        .await
        .map_err(|_| FulfillmentError::provider("payment provider timed out", true))??;
        metrics::histogram!("payment_session_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        self.orders
            .attach_session(order.id, &session.id, expires_at)
            .await?;
        Ok(session)
    }

    /// Undoes a checkout whose order could not be handed to the shopper.
    ///
    /// Stock goes back through the cart only once the order is gone. If the
    /// order survives (a storage failure, or a payment already landed) it
    /// keeps the stock, and the cart is dropped without releasing anything.
    async fn abort_checkout(&self, guard: &CartGuard, order_id: Option<OrderId>) {
        let order_gone = match order_id {
            None => true,
            Some(order_id) => match self.orders.discard_unpaid(order_id).await {
                Ok(true) => true,
                Ok(false) => {
                    tracing::warn!(%order_id, "order left its unpaid state during rollback");
                    false
                }
                Err(e) => {
                    tracing::error!(%order_id, error = %e, "failed to discard order");
                    false
                }
            },
        };

        if order_gone {
            if let Err(e) = self.carts.release_locked(guard).await {
                tracing::error!(user_id = %guard.user_id(), error = %e, "failed to release cart");
            }
        } else if let Err(e) = self.carts.delete_locked(guard).await {
            tracing::error!(
                user_id = %guard.user_id(),
                error = %e,
                "failed to drop cart of surviving order"
            );
        }
    }
}

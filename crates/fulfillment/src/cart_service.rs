//! Cart mutations, validation and stock reservation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use common::{ProductId, UserId};
use dashmap::DashMap;
use domain::{Cart, Money};
use serde::Serialize;
use store::{CartStore, Catalog, InventoryStore, Product};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::clock::Clock;
use crate::error::{FulfillmentError, Result};

/// Exclusive access to one user's cart.
///
/// Every cart read-modify-write happens while holding the guard, so a
/// reservation can never interleave with another mutation of the same cart.
pub struct CartGuard {
    user_id: UserId,
    locks: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl CartGuard {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl Drop for CartGuard {
    fn drop(&mut self) {
        // The map and this guard are the only holders when nobody waits.
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 2);
    }
}

/// Per-user async mutexes, present only while a user's cart is in use.
#[derive(Default)]
struct CartLocks {
    locks: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl CartLocks {
    async fn acquire(&self, user_id: UserId) -> CartGuard {
        let lock = self.locks.entry(user_id).or_default().clone();
        CartGuard {
            user_id,
            locks: Arc::clone(&self.locks),
            _guard: lock.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

/// A cart line priced from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub amount_left: u32,
}

/// A user's cart with current prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total: Money,
    pub locked: bool,
}

/// A cart whose stock has been reserved.
#[derive(Debug, Clone)]
pub struct ReservedCart {
    pub cart: Cart,
    pub products: Vec<Product>,
}

/// Validates carts against the inventory and reserves their stock.
pub struct CartService {
    carts: Arc<dyn CartStore>,
    inventory: Arc<dyn InventoryStore>,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    reservation_ttl: Duration,
    locks: CartLocks,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartStore>,
        inventory: Arc<dyn InventoryStore>,
        catalog: Arc<dyn Catalog>,
        clock: Arc<dyn Clock>,
        reservation_ttl: Duration,
    ) -> Self {
        Self {
            carts,
            inventory,
            catalog,
            clock,
            reservation_ttl,
            locks: CartLocks::default(),
        }
    }

    /// Waits for exclusive access to the user's cart.
    pub async fn lock(&self, user_id: UserId) -> CartGuard {
        self.locks.acquire(user_id).await
    }

    pub async fn get_cart(&self, guard: &CartGuard) -> Result<Option<Cart>> {
        Ok(self.carts.get(guard.user_id()).await?)
    }

    /// Adds one unit, if the product is available and has a unit to spare.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(&self, user_id: UserId, product_id: ProductId) -> Result<u32> {
        let guard = self.lock(user_id).await;
        let now = self.clock.now();

        let product = self
            .catalog
            .get_product(&product_id)
            .await?
            .ok_or_else(|| FulfillmentError::ProductNotFound(product_id.clone()))?;
        let mut cart = self
            .carts
            .get(guard.user_id())
            .await?
            .unwrap_or_else(|| Cart::new(user_id, now));

        if cart.is_locked() {
            return Err(FulfillmentError::CartLocked);
        }
        if !product.available || product.amount_left < cart.quantity(&product_id) + 1 {
            return Err(FulfillmentError::OutOfStock(product_id));
        }

        let quantity = cart.add_one(product_id, now)?;
        self.carts.put(&cart).await?;
        metrics::counter!("cart_items_added_total").increment(1);
        Ok(quantity)
    }

    /// Removes one unit; the line disappears at zero.
    #[tracing::instrument(skip(self))]
    pub async fn remove_from_cart(&self, user_id: UserId, product_id: ProductId) -> Result<u32> {
        let guard = self.lock(user_id).await;
        let mut cart = self.load_existing(&guard).await?;
        let left = cart.remove_one(&product_id, self.clock.now())?;
        self.save_or_drop(&cart).await?;
        Ok(left)
    }

    /// Drops a whole product line.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, user_id: UserId, product_id: ProductId) -> Result<u32> {
        let guard = self.lock(user_id).await;
        let mut cart = self.load_existing(&guard).await?;
        let removed = cart.remove_line(&product_id, self.clock.now())?;
        self.save_or_drop(&cart).await?;
        Ok(removed)
    }

    /// Deletes an unlocked cart. Reserved carts must be released first.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: UserId) -> Result<bool> {
        let guard = self.lock(user_id).await;
        match self.carts.get(guard.user_id()).await? {
            Some(cart) if cart.is_locked() => Err(FulfillmentError::CartLocked),
            Some(_) => Ok(self.carts.delete(guard.user_id()).await?),
            None => Ok(false),
        }
    }

    /// The cart priced with current catalog prices; empty when there is none.
    pub async fn view_cart(&self, user_id: UserId) -> Result<CartView> {
        let Some(cart) = self.carts.get(user_id).await? else {
            return Ok(CartView {
                lines: Vec::new(),
                total: Money::zero(),
                locked: false,
            });
        };

        let products = self.products_by_id(&cart).await?;
        let lines: Vec<CartLine> = cart
            .lines()
            .filter_map(|(id, quantity)| {
                products.get(id).map(|p| CartLine {
                    product_id: id.clone(),
                    name: p.name.clone(),
                    quantity,
                    unit_price: p.price,
                    line_total: p.price.multiply(quantity),
                    amount_left: p.amount_left,
                })
            })
            .collect();
        let total = lines.iter().map(|l| l.line_total).sum();

        Ok(CartView {
            lines,
            total,
            locked: cart.is_locked(),
        })
    }

    /// Validates the user's stored cart without reserving anything.
    pub async fn validate_current_cart(&self, user_id: UserId) -> Result<Vec<Product>> {
        let cart = self
            .carts
            .get(user_id)
            .await?
            .ok_or(FulfillmentError::EmptyCart)?;
        self.validate_cart(&cart).await
    }

    /// Checks every line against the stock left.
    ///
    /// Empty and locked carts both fail with `EmptyCart`.
    pub async fn validate_cart(&self, cart: &Cart) -> Result<Vec<Product>> {
        if cart.is_empty() || cart.is_locked() {
            return Err(FulfillmentError::EmptyCart);
        }

        let products = self.products_by_id(cart).await?;
        let mut validated = Vec::with_capacity(cart.line_count());
        for (id, quantity) in cart.lines() {
            let product = products
                .get(id)
                .ok_or_else(|| FulfillmentError::ProductNotFound(id.clone()))?;
            if !product.available || product.amount_left < quantity {
                return Err(FulfillmentError::InsufficientStock(id.clone()));
            }
            validated.push(product.clone());
        }
        Ok(validated)
    }

    /// Reserves every line of the user's cart and locks it.
    pub async fn reserve_for_checkout(&self, user_id: UserId) -> Result<ReservedCart> {
        let guard = self.lock(user_id).await;
        self.reserve_locked(&guard).await
    }

    /// Reserves while the caller already holds the cart guard.
    ///
    /// Lines are reserved in product id order. Any failure releases the
    /// units taken so far, leaving stock and cart unchanged.
    #[tracing::instrument(skip(self, guard), fields(user_id = %guard.user_id()))]
    pub async fn reserve_locked(&self, guard: &CartGuard) -> Result<ReservedCart> {
        let mut cart = self.load_existing(guard).await?;
        let products = self.validate_cart(&cart).await?;

        let mut reserved: Vec<(ProductId, u32)> = Vec::with_capacity(cart.line_count());
        for (id, quantity) in cart.lines() {
            match self.inventory.try_reserve(id, quantity).await {
                Ok(true) => reserved.push((id.clone(), quantity)),
                Ok(false) => {
                    self.rollback(&reserved).await;
                    metrics::counter!("reservations_failed_total").increment(1);
                    return Err(FulfillmentError::InsufficientStock(id.clone()));
                }
                Err(e) => {
                    self.rollback(&reserved).await;
                    return Err(e.into());
                }
            }
        }

        cart.lock(self.clock.now());
        if let Err(e) = self.carts.put(&cart).await {
            self.rollback(&reserved).await;
            return Err(e.into());
        }

        metrics::counter!("reservations_total").increment(1);
        tracing::info!(lines = reserved.len(), "cart reserved");
        Ok(ReservedCart { cart, products })
    }

    /// Reuses an existing reservation, or reserves the cart now.
    pub async fn ensure_reserved(&self, guard: &CartGuard) -> Result<ReservedCart> {
        let cart = self.load_existing(guard).await?;
        if !cart.is_locked() {
            return self.reserve_locked(guard).await;
        }

        let mut by_id = self.products_by_id(&cart).await?;
        let products = cart
            .lines()
            .map(|(id, _)| {
                by_id
                    .remove(id)
                    .ok_or_else(|| FulfillmentError::ProductNotFound(id.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ReservedCart { cart, products })
    }

    /// Returns a reserved cart's stock and unlocks it.
    pub async fn release_and_unlock(&self, user_id: UserId) -> Result<Cart> {
        let guard = self.lock(user_id).await;
        self.release_locked(&guard).await
    }

    /// Unlocks the cart, then returns its units to stock.
    ///
    /// The cart is persisted unlocked before stock is released so a failed
    /// release can never be replayed by a later sweep.
    #[tracing::instrument(skip(self, guard), fields(user_id = %guard.user_id()))]
    pub async fn release_locked(&self, guard: &CartGuard) -> Result<Cart> {
        let mut cart = self
            .carts
            .get(guard.user_id())
            .await?
            .ok_or(FulfillmentError::CartNotReserved)?;
        if !cart.is_locked() {
            return Err(FulfillmentError::CartNotReserved);
        }

        cart.unlock(self.clock.now());
        self.carts.put(&cart).await?;
        self.release_lines(&cart).await?;
        metrics::counter!("reservations_released_total").increment(1);
        Ok(cart)
    }

    /// Deletes the cart after its snapshot became an order.
    pub async fn delete_locked(&self, guard: &CartGuard) -> Result<bool> {
        Ok(self.carts.delete(guard.user_id()).await?)
    }

    /// Σ quantity × current catalog price. Lines whose product vanished
    /// from the catalog count as zero.
    pub async fn calculate_total(&self, cart: &Cart) -> Result<Money> {
        let products = self.products_by_id(cart).await?;
        Ok(cart
            .lines()
            .filter_map(|(id, quantity)| products.get(id).map(|p| p.price.multiply(quantity)))
            .sum())
    }

    /// Releases locked carts untouched for longer than the reservation TTL
    /// and deletes them. Returns the number of carts released.
    #[tracing::instrument(skip(self))]
    pub async fn expire_reservations(&self) -> Result<usize> {
        let candidates: Vec<UserId> = {
            let now = self.clock.now();
            self.carts
                .list()
                .await?
                .into_iter()
                .filter(|c| c.reservation_expired(now, self.reservation_ttl))
                .map(|c| c.user_id())
                .collect()
        };

        let mut released = 0;
        for user_id in candidates {
            let guard = self.lock(user_id).await;
            // Re-read under the guard; checkout may have consumed the cart.
            let Some(cart) = self.carts.get(guard.user_id()).await? else {
                continue;
            };
            if !cart.reservation_expired(self.clock.now(), self.reservation_ttl) {
                continue;
            }

            self.carts.delete(guard.user_id()).await?;
            if let Err(e) = self.release_lines(&cart).await {
                tracing::error!(%user_id, error = %e, "failed to release expired reservation");
                continue;
            }
            released += 1;
        }

        if released > 0 {
            metrics::counter!("reservations_expired_total").increment(released as u64);
        }
        Ok(released)
    }

    async fn load_existing(&self, guard: &CartGuard) -> Result<Cart> {
        self.carts
            .get(guard.user_id())
            .await?
            .ok_or(FulfillmentError::EmptyCart)
    }

    async fn save_or_drop(&self, cart: &Cart) -> Result<()> {
        if cart.is_empty() {
            self.carts.delete(cart.user_id()).await?;
        } else {
            self.carts.put(cart).await?;
        }
        Ok(())
    }

    async fn products_by_id(&self, cart: &Cart) -> Result<HashMap<ProductId, Product>> {
        let ids: Vec<ProductId> = cart.lines().map(|(id, _)| id.clone()).collect();
        Ok(self
            .catalog
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect())
    }

    /// Releases every line, attempting all of them; returns the first error.
    async fn release_lines(&self, cart: &Cart) -> Result<()> {
        let mut first_error = None;
        for (id, quantity) in cart.lines() {
            if let Err(e) = self.inventory.release(id, quantity).await {
                tracing::error!(product_id = %id, quantity, error = %e, "stock release failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn rollback(&self, reserved: &[(ProductId, u32)]) {
        for (id, quantity) in reserved {
            if let Err(e) = self.inventory.release(id, *quantity).await {
                tracing::error!(
                    product_id = %id,
                    quantity,
                    error = %e,
                    "reservation rollback failed"
                );
            }
        }
    }
}

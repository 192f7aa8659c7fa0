//! Per-user shopping cart.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by cart mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    /// The cart is reserved for checkout and cannot be modified.
    #[error("Cart is locked for checkout")]
    Locked,

    /// The product is not in the cart.
    #[error("Product not in cart: {product_id}")]
    ItemNotFound { product_id: ProductId },
}

/// A user's cart: product quantities plus the checkout lock.
///
/// Quantities are always greater than zero; a product with no units has no
/// entry. Lines are kept in product id order so reservations walk them in a
/// stable order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    user_id: UserId,
    products: BTreeMap<ProductId, u32>,
    order_processing: bool,
    last_modified: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty, unlocked cart.
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            products: BTreeMap::new(),
            order_processing: false,
            last_modified: now,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Units of `product_id` in the cart, zero when absent.
    pub fn quantity(&self, product_id: &ProductId) -> u32 {
        self.products.get(product_id).copied().unwrap_or(0)
    }

    /// Cart lines in product id order.
    pub fn lines(&self) -> impl Iterator<Item = (&ProductId, u32)> {
        self.products.iter().map(|(id, qty)| (id, *qty))
    }

    pub fn line_count(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// True while stock is reserved for this cart.
    pub fn is_locked(&self) -> bool {
        self.order_processing
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// A locked cart whose last change is older than `ttl`.
    pub fn reservation_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.order_processing && self.last_modified < now - ttl
    }

    /// Adds one unit of a product.
    pub fn add_one(&mut self, product_id: ProductId, now: DateTime<Utc>) -> Result<u32, CartError> {
        self.ensure_unlocked()?;
        let qty = self.products.entry(product_id).or_insert(0);
        *qty += 1;
        let qty = *qty;
        self.last_modified = now;
        Ok(qty)
    }

    /// Removes one unit of a product, dropping the line at zero.
    pub fn remove_one(
        &mut self,
        product_id: &ProductId,
        now: DateTime<Utc>,
    ) -> Result<u32, CartError> {
        self.ensure_unlocked()?;
        let Some(qty) = self.products.get_mut(product_id) else {
            return Err(CartError::ItemNotFound {
                product_id: product_id.clone(),
            });
        };
        *qty -= 1;
        let left = *qty;
        if left == 0 {
            self.products.remove(product_id);
        }
        self.last_modified = now;
        Ok(left)
    }

    /// Drops a product line entirely.
    pub fn remove_line(
        &mut self,
        product_id: &ProductId,
        now: DateTime<Utc>,
    ) -> Result<u32, CartError> {
        self.ensure_unlocked()?;
        let removed = self
            .products
            .remove(product_id)
            .ok_or_else(|| CartError::ItemNotFound {
                product_id: product_id.clone(),
            })?;
        self.last_modified = now;
        Ok(removed)
    }

    /// Marks the cart as reserved for checkout.
    pub fn lock(&mut self, now: DateTime<Utc>) {
        self.order_processing = true;
        self.last_modified = now;
    }

    /// Clears the checkout flag after reserved stock was released.
    pub fn unlock(&mut self, now: DateTime<Utc>) {
        self.order_processing = false;
        self.last_modified = now;
    }

    fn ensure_unlocked(&self) -> Result<(), CartError> {
        if self.order_processing {
            return Err(CartError::Locked);
        }
        Ok(())
    }
}

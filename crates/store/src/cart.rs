//! Volatile cart storage.

use async_trait::async_trait;
use common::UserId;
use domain::Cart;

use crate::Result;

/// Key/value storage of carts by user id. Carts never expire on their own.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Stores the cart, replacing any previous version.
    async fn put(&self, cart: &Cart) -> Result<()>;

    /// Removes the cart. Returns `true` if one existed.
    async fn delete(&self, user_id: UserId) -> Result<bool>;

    /// Every stored cart, for reconciliation sweeps.
    async fn list(&self) -> Result<Vec<Cart>>;
}

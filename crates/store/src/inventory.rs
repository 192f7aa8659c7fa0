//! Stock counters.

use async_trait::async_trait;
use common::ProductId;

use crate::Result;

/// Atomic stock counters per product.
///
/// Implementations never read-modify-write: every mutation is a single
/// conditional update, so concurrent callers cannot oversell.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Decrements `amount_left` by `quantity` iff enough units are left.
    ///
    /// Returns `false` when stock is insufficient or the product is unknown.
    async fn try_reserve(&self, product_id: &ProductId, quantity: u32) -> Result<bool>;

    /// Returns previously reserved units to stock.
    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<()>;

    /// Adds to the sales counter.
    async fn increment_sold(&self, product_id: &ProductId, quantity: u32) -> Result<()>;

    async fn amount_left(&self, product_id: &ProductId) -> Result<Option<u32>>;

    async fn orders_sold(&self, product_id: &ProductId) -> Result<Option<u64>>;

    /// Overwrites the stock level (restock).
    async fn set_stock(&self, product_id: &ProductId, amount: u32) -> Result<()>;
}

//! In-memory store implementations for tests and local runs.
//!
//! Each store keeps its state behind a single `RwLock`; conditional updates
//! run under the write lock, which makes them atomic with respect to each
//! other.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{Cart, Order, OrderStatus};
use tokio::sync::RwLock;

use crate::{
    CartStore, Catalog, InventoryStore, OrderPage, OrderQuery, OrderStore, Product, Result,
    StoreError, order::check_transition,
};

/// In-memory products table serving both stock counters and catalog reads.
#[derive(Clone, Default)]
pub struct InMemoryInventory {
    products: Arc<RwLock<BTreeMap<ProductId, Product>>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an inventory seeded with `products`.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let map = products.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            products: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn product_count(&self) -> usize {
        self.products.read().await.len()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventory {
    async fn try_reserve(&self, product_id: &ProductId, quantity: u32) -> Result<bool> {
        let mut products = self.products.write().await;
        match products.get_mut(product_id) {
            Some(product) if product.amount_left >= quantity => {
                product.amount_left -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;
        product.amount_left = product
            .amount_left
            .checked_add(quantity)
            .ok_or_else(|| StoreError::StockOverflow(product_id.clone()))?;
        Ok(())
    }

    async fn increment_sold(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;
        product.orders_sold += u64::from(quantity);
        Ok(())
    }

    async fn amount_left(&self, product_id: &ProductId) -> Result<Option<u32>> {
        Ok(self.products.read().await.get(product_id).map(|p| p.amount_left))
    }

    async fn orders_sold(&self, product_id: &ProductId) -> Result<Option<u64>> {
        Ok(self.products.read().await.get(product_id).map(|p| p.orders_sold))
    }

    async fn set_stock(&self, product_id: &ProductId, amount: u32) -> Result<()> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;
        product.amount_left = amount;
        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryInventory {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(product_id).cloned())
    }

    async fn get_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        let mut found: Vec<Product> = product_ids
            .iter()
            .filter_map(|id| products.get(id).cloned())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found.dedup_by(|a, b| a.id == b.id);
        Ok(found)
    }

    async fn find_related(
        &self,
        categories: &[String],
        exclude: &ProductId,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        let mut related: Vec<Product> = products
            .values()
            .filter(|p| p.available && &p.id != exclude)
            .filter(|p| p.categories.iter().any(|c| categories.contains(c)))
            .cloned()
            .collect();
        related.sort_by(|a, b| b.orders_sold.cmp(&a.orders_sold).then(a.id.cmp(&b.id)));
        related.truncate(limit);
        Ok(related)
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        let mut products = self.products.write().await;
        let orders_sold = products
            .get(&product.id)
            .map_or(product.orders_sold, |existing| existing.orders_sold);
        products.insert(
            product.id.clone(),
            Product {
                orders_sold,
                ..product.clone()
            },
        );
        Ok(())
    }
}

/// In-memory cart store.
#[derive(Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<UserId, Cart>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cart_count(&self) -> usize {
        self.carts.read().await.len()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get(&self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.carts.read().await.get(&user_id).cloned())
    }

    async fn put(&self, cart: &Cart) -> Result<()> {
        self.carts.write().await.insert(cart.user_id(), cart.clone());
        Ok(())
    }

    async fn delete(&self, user_id: UserId) -> Result<bool> {
        Ok(self.carts.write().await.remove(&user_id).is_some())
    }

    async fn list(&self) -> Result<Vec<Cart>> {
        Ok(self.carts.read().await.values().cloned().collect())
    }
}

/// In-memory order store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    fn newest_first(orders: &mut [Order]) {
        orders.sort_by(|a, b| {
            b.order_date
                .cmp(&a.order_date)
                .then(a.id.as_uuid().cmp(&b.id.as_uuid()))
        });
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if let Some(session_id) = &order.session_id
            && orders.values().any(|o| o.session_id.as_ref() == Some(session_id))
        {
            return Err(StoreError::DuplicateSession(session_id.clone()));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        Self::newest_first(&mut orders);
        Ok(orders)
    }

    async fn list(&self, query: &OrderQuery) -> Result<OrderPage> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| query.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        Self::newest_first(&mut orders);
        let total = orders.len() as u64;
        let page = orders
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.limit() as usize)
            .collect();
        Ok(OrderPage {
            orders: page,
            total,
            page: query.page,
            size: query.limit(),
        })
    }

    async fn attach_session(
        &self,
        id: OrderId,
        session_id: &str,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut orders = self.orders.write().await;
        if orders
            .values()
            .any(|o| o.id != id && o.session_id.as_deref() == Some(session_id))
        {
            return Err(StoreError::DuplicateSession(session_id.to_string()));
        }
        match orders.get_mut(&id) {
            Some(order) if order.status == OrderStatus::Created && !order.has_open_session(at) => {
                order.session_id = Some(session_id.to_string());
                order.session_expires_at = Some(expires_at);
                order.last_modified = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition(
        &self,
        id: OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        check_transition(from, to)?;
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) if from.contains(&order.status) => {
                order.transition(to, at)?;
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_if_status(&self, id: OrderId, status: OrderStatus) -> Result<Option<Order>> {
        let mut orders = self.orders.write().await;
        match orders.get(&id) {
            Some(order) if order.status == status => Ok(orders.remove(&id)),
            _ => Ok(None),
        }
    }

    async fn find_stale(
        &self,
        statuses: &[OrderStatus],
        before: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let mut stale: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| statuses.contains(&o.status) && o.last_modified < before)
            .cloned()
            .collect();
        stale.sort_by_key(|o| o.last_modified);
        Ok(stale)
    }
}

//! Product catalog lookups.

use async_trait::async_trait;
use common::ProductId;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A catalog product with its stock counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub amount_left: u32,
    pub available: bool,
    pub orders_sold: u64,
    pub categories: Vec<String>,
}

impl Product {
    /// Creates an available product with no sales.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        amount_left: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            amount_left,
            available: true,
            orders_sold: 0,
            categories: Vec::new(),
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }
}

/// Read access to the product catalog, plus the product editor's upsert.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns a product by id.
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Returns the products that exist among `product_ids`, in id order.
    async fn get_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Available products sharing a category with `categories`, excluding
    /// `exclude`, best sellers first.
    async fn find_related(
        &self,
        categories: &[String],
        exclude: &ProductId,
        limit: usize,
    ) -> Result<Vec<Product>>;

    /// Inserts or replaces a product. `orders_sold` is kept for existing rows.
    async fn upsert_product(&self, product: &Product) -> Result<()>;
}

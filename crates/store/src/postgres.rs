//! PostgreSQL implementations of the inventory, catalog and order stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{LineItem, Money, Order, OrderStatus, PaymentMethod, ShippingAddress};
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Catalog, InventoryStore, OrderPage, OrderQuery, OrderStore, Product, Result, StoreError,
    order::check_transition,
};

const PRODUCT_COLUMNS: &str =
    "product_id, name, price_cents, amount_left, available, orders_sold, categories";

const ORDER_COLUMNS: &str = "id, user_id, status, line_items, shipping_address, delivery_time, \
     shipping_price_cents, payment_method, contact_email, total_price_cents, session_id, \
     session_expires_at, order_date, last_modified, delivery_date";

/// Opens a connection pool.
pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Runs the database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

fn to_count(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn status_names(statuses: &[OrderStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Products table backing stock counters and catalog reads.
#[derive(Clone)]
pub struct PostgresInventory {
    pool: PgPool,
}

impl PostgresInventory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let amount_left: i64 = row.try_get("amount_left")?;
        let orders_sold: i64 = row.try_get("orders_sold")?;
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("product_id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            amount_left: to_count(amount_left, "amount_left")?,
            available: row.try_get("available")?,
            orders_sold: u64::try_from(orders_sold)
                .map_err(|_| StoreError::Corrupt(format!("orders_sold negative: {orders_sold}")))?,
            categories: row.try_get("categories")?,
        })
    }

    async fn bump(&self, column: &str, product_id: &ProductId, quantity: u32) -> Result<()> {
        let sql = format!("UPDATE products SET {column} = {column} + $2 WHERE product_id = $1");
        let result = sqlx::query(&sql)
            .bind(product_id.as_str())
            .bind(i64::from(quantity))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(product_id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresInventory {
    async fn try_reserve(&self, product_id: &ProductId, quantity: u32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET amount_left = amount_left - $2
            WHERE product_id = $1 AND amount_left >= $2
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        self.bump("amount_left", product_id, quantity).await
    }

    async fn increment_sold(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        self.bump("orders_sold", product_id, quantity).await
    }

    async fn amount_left(&self, product_id: &ProductId) -> Result<Option<u32>> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT amount_left FROM products WHERE product_id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        value.map(|v| to_count(v, "amount_left")).transpose()
    }

    async fn orders_sold(&self, product_id: &ProductId) -> Result<Option<u64>> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT orders_sold FROM products WHERE product_id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.map(|v| v.max(0) as u64))
    }

    async fn set_stock(&self, product_id: &ProductId, amount: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET amount_left = $2 WHERE product_id = $1")
            .bind(product_id.as_str())
            .bind(i64::from(amount))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(product_id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for PostgresInventory {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1");
        let row = sqlx::query(&sql)
            .bind(product_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<&str> = product_ids.iter().map(ProductId::as_str).collect();
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = ANY($1) ORDER BY product_id"
        );
        let rows = sqlx::query(&sql).bind(ids).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn find_related(
        &self,
        categories: &[String],
        exclude: &ProductId,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE categories && $1 AND product_id <> $2 AND available
            ORDER BY orders_sold DESC, product_id
            LIMIT $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(categories)
            .bind(exclude.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products
                (product_id, name, price_cents, amount_left, available, orders_sold, categories)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (product_id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                amount_left = EXCLUDED.amount_left,
                available = EXCLUDED.available,
                categories = EXCLUDED.categories
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.amount_left))
        .bind(product.available)
        .bind(i64::try_from(product.orders_sold).unwrap_or(i64::MAX))
        .bind(&product.categories)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Orders table with status compare-and-set.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let delivery_time: String = row.try_get("delivery_time")?;
        let line_items: serde_json::Value = row.try_get("line_items")?;
        let shipping_address: serde_json::Value = row.try_get("shipping_address")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            line_items: serde_json::from_value::<Vec<LineItem>>(line_items)?,
            status: status
                .parse()
                .map_err(|e: domain::UnknownStatus| StoreError::Corrupt(e.to_string()))?,
            shipping_address: serde_json::from_value::<ShippingAddress>(shipping_address)?,
            delivery_time: delivery_time.parse().map_err(StoreError::Corrupt)?,
            shipping_price: Money::from_cents(row.try_get("shipping_price_cents")?),
            payment_method: PaymentMethod::new(row.try_get::<String, _>("payment_method")?),
            contact_email: row.try_get("contact_email")?,
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            session_id: row.try_get("session_id")?,
            session_expires_at: row.try_get("session_expires_at")?,
            order_date: row.try_get("order_date")?,
            last_modified: row.try_get("last_modified")?,
            delivery_date: row.try_get("delivery_date")?,
        })
    }

    fn map_session_conflict(err: sqlx::Error, session_id: &str) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.constraint() == Some("unique_order_session")
        {
            return StoreError::DuplicateSession(session_id.to_string());
        }
        StoreError::Database(err)
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let line_items = serde_json::to_value(&order.line_items)?;
        let shipping_address = serde_json::to_value(&order.shipping_address)?;
        let sql = format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        );
        sqlx::query(&sql)
            .bind(order.id.as_uuid())
            .bind(order.user_id.as_uuid())
            .bind(order.status.as_str())
            .bind(line_items)
            .bind(shipping_address)
            .bind(order.delivery_time.as_str())
            .bind(order.shipping_price.cents())
            .bind(order.payment_method.as_str())
            .bind(&order.contact_email)
            .bind(order.total_price.cents())
            .bind(&order.session_id)
            .bind(order.session_expires_at)
            .bind(order.order_date)
            .bind(order.last_modified)
            .bind(order.delivery_date)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Self::map_session_conflict(e, order.session_id.as_deref().unwrap_or_default())
            })?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE session_id = $1");
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY order_date DESC, id"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn list(&self, query: &OrderQuery) -> Result<OrderPage> {
        let status = query.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY order_date DESC, id
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(status)
            .bind(i64::from(query.limit()))
            .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Ok(OrderPage {
            orders: rows
                .into_iter()
                .map(Self::row_to_order)
                .collect::<Result<_>>()?,
            total: total.max(0) as u64,
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
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET session_id = $2, session_expires_at = $3, last_modified = $4
            WHERE id = $1
              AND status = 'CREATED'
              AND (session_id IS NULL OR session_expires_at IS NULL OR session_expires_at <= $4)
            "#,
        )
        .bind(id.as_uuid())
        .bind(session_id)
        .bind(expires_at)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_session_conflict(e, session_id))?;
        Ok(result.rows_affected() == 1)
    }

    async fn transition(
        &self,
        id: OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        check_transition(from, to)?;
        let sql = format!(
            r#"
            UPDATE orders
            SET status = $3,
                last_modified = $4,
                delivery_date = CASE WHEN $3 = 'DELIVERED' THEN $4 ELSE delivery_date END
            WHERE id = $1 AND status = ANY($2)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(status_names(from))
            .bind(to.as_str())
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn delete_if_status(&self, id: OrderId, status: OrderStatus) -> Result<Option<Order>> {
        let sql = format!(
            "DELETE FROM orders WHERE id = $1 AND status = $2 RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_stale(
        &self,
        statuses: &[OrderStatus],
        before: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE status = ANY($1) AND last_modified < $2
            ORDER BY last_modified
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(status_names(statuses))
            .bind(before)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }
}

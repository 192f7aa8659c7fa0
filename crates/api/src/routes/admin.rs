//! Admin endpoints: all orders and catalog maintenance.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{OrderId, ProductId};
use domain::{Money, Order, OrderStatus};
use serde::{Deserialize, Serialize};
use store::{OrderPage, OrderQuery, Product};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::identity::Identity;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListOrdersParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub name: String,
    pub price_cents: i64,
    pub amount_left: u32,
    #[serde(default = "available_by_default")]
    pub available: bool,
    #[serde(default)]
    pub categories: Vec<String>,
}

fn available_by_default() -> bool {
    true
}

#[derive(Deserialize)]
pub struct StockRequest {
    pub amount: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockResponse {
    pub product_id: String,
    pub amount_left: u32,
}

/// GET /admin/orders: all orders, paged, optionally filtered by status.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Query(params): Query<ListOrdersParams>,
) -> ApiResult<Json<OrderPage>> {
    let caller = caller.require_admin()?;

    let mut query = OrderQuery::default();
    if params.page.is_some() || params.size.is_some() {
        let default_size = query.size;
        query = query.page(params.page.unwrap_or(0), params.size.unwrap_or(default_size));
    }
    if let Some(status) = params.status {
        let status: OrderStatus = status
            .parse()
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
        query = query.with_status(status);
    }

    Ok(Json(state.orders.list_orders(caller, &query).await?))
}

/// POST /admin/orders/{id}/cancel: cancels any user's unshipped order.
#[tracing::instrument(skip(state))]
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    let caller = caller.require_admin()?;
    Ok(Json(state.orders.cancel_order(caller, OrderId::from_uuid(id)).await?))
}

/// PUT /admin/products/{id}: creates or replaces a catalog entry.
#[tracing::instrument(skip(state, req))]
pub async fn upsert_product(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<String>,
    Json(req): Json<ProductRequest>,
) -> ApiResult<Json<Product>> {
    caller.require_admin()?;
    if req.price_cents < 0 {
        return Err(ApiError::BadRequest("price must not be negative".to_string()));
    }

    let mut product = Product::new(
        id,
        req.name,
        Money::from_cents(req.price_cents),
        req.amount_left,
    )
    .with_categories(req.categories);
    if !req.available {
        product = product.unavailable();
    }
    state.catalog.upsert_product(&product).await?;
    Ok(Json(product))
}

/// PUT /admin/products/{id}/stock: overwrites the stock left.
#[tracing::instrument(skip(state, req))]
pub async fn set_stock(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<String>,
    Json(req): Json<StockRequest>,
) -> ApiResult<Json<StockResponse>> {
    caller.require_admin()?;
    state
        .inventory
        .set_stock(&ProductId::new(id.as_str()), req.amount)
        .await?;
    Ok(Json(StockResponse {
        product_id: id,
        amount_left: req.amount,
    }))
}

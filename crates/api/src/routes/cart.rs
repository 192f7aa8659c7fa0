//! Cart endpoints for the calling user.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use fulfillment::CartView;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::identity::Identity;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    pub product_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemResponse {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CartValidResponse {
    pub valid: bool,
}

/// GET /cart: the caller's cart with current prices.
pub async fn view(
    State(state): State<Arc<AppState>>,
    caller: Identity,
) -> ApiResult<Json<CartView>> {
    Ok(Json(state.carts.view_cart(caller.user_id()).await?))
}

/// POST /cart/add: adds one unit of a product.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id))]
pub async fn add(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Json(req): Json<CartItemRequest>,
) -> ApiResult<Json<CartItemResponse>> {
    let quantity = state
        .carts
        .add_to_cart(caller.user_id(), ProductId::new(req.product_id.as_str()))
        .await?;
    Ok(Json(CartItemResponse {
        product_id: req.product_id,
        quantity,
    }))
}

/// POST /cart/remove: removes one unit of a product.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Json(req): Json<CartItemRequest>,
) -> ApiResult<Json<CartItemResponse>> {
    let quantity = state
        .carts
        .remove_from_cart(caller.user_id(), ProductId::new(req.product_id.as_str()))
        .await?;
    Ok(Json(CartItemResponse {
        product_id: req.product_id,
        quantity,
    }))
}

/// DELETE /cart/{product_id}: drops a whole product line.
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(product_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .carts
        .delete_product(caller.user_id(), ProductId::new(product_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cart: empties an unreserved cart.
pub async fn clear(State(state): State<Arc<AppState>>, caller: Identity) -> ApiResult<StatusCode> {
    state.carts.clear_cart(caller.user_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /cart/valid: whether every line still fits the stock left.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    caller: Identity,
) -> ApiResult<Json<CartValidResponse>> {
    state.carts.validate_current_cart(caller.user_id()).await?;
    Ok(Json(CartValidResponse { valid: true }))
}

//! The calling user's orders.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use domain::Order;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::identity::Identity;
use crate::state::AppState;

/// GET /orders: the caller's orders, newest first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    caller: Identity,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.orders.list_user_orders(caller.user_id()).await?))
}

/// GET /orders/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.orders.get_order(caller.0, OrderId::from_uuid(id)).await?))
}

/// POST /orders/{id}/cancel: cancels before shipping and restocks.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.orders.cancel_order(caller.0, OrderId::from_uuid(id)).await?))
}

/// POST /orders/{id}/refund: refunds a delivered order within the return window.
#[tracing::instrument(skip(state))]
pub async fn refund(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.orders.refund_order(caller.0, OrderId::from_uuid(id)).await?))
}

//! Checkout, payment session and provider webhook endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use common::OrderId;
use fulfillment::webhook::SIGNATURE_HEADER;
use fulfillment::{CheckoutDetails, CheckoutSummary, PaymentRedirect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::identity::Identity;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepayRequest {
    pub order_id: Uuid,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// GET /payment/summary: reserves the cart and returns checkout totals.
pub async fn summary(
    State(state): State<Arc<AppState>>,
    caller: Identity,
) -> ApiResult<Json<CheckoutSummary>> {
    Ok(Json(state.payments.summary(caller.user_id()).await?))
}

/// POST /payment/create: places the order and opens a payment session.
#[tracing::instrument(skip(state, details), fields(user_id = %caller.user_id()))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Json(details): Json<CheckoutDetails>,
) -> ApiResult<(StatusCode, Json<PaymentRedirect>)> {
    let redirect = state.payments.checkout(caller.user_id(), details).await?;
    Ok((StatusCode::CREATED, Json(redirect)))
}

/// POST /payment/repay: new session for an unpaid order.
pub async fn repay(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Json(req): Json<RepayRequest>,
) -> ApiResult<Json<PaymentRedirect>> {
    let redirect = state
        .payments
        .create_payment_session(caller.0, OrderId::from_uuid(req.order_id))
        .await?;
    Ok(Json(redirect))
}

/// DELETE /payment/cancel: releases the reserved cart.
pub async fn cancel(State(state): State<Arc<AppState>>, caller: Identity) -> ApiResult<StatusCode> {
    state.payments.cancel_payment(caller.user_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /payment/webhook: provider callback.
///
/// Acknowledged with 200 unless storage failed, in which case the provider
/// retries.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookAck { received: true }))
}

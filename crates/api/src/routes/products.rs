//! Public catalog lookups.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::ProductId;
use serde::Deserialize;
use store::Product;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_RELATED: usize = 4;
const MAX_RELATED: usize = 20;

#[derive(Deserialize)]
pub struct RelatedParams {
    pub limit: Option<usize>,
}

/// GET /products/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    let id = ProductId::new(id);
    state
        .catalog
        .get_product(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {id}")))
}

/// GET /products/{id}/related: best sellers sharing a category.
pub async fn related(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<RelatedParams>,
) -> ApiResult<Json<Vec<Product>>> {
    let id = ProductId::new(id);
    let product = state
        .catalog
        .get_product(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {id}")))?;
    let limit = params.limit.unwrap_or(DEFAULT_RELATED).clamp(1, MAX_RELATED);

    let related = state
        .catalog
        .find_related(&product.categories, &id, limit)
        .await?;
    Ok(Json(related))
}

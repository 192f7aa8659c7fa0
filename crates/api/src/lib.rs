//! HTTP API server for the storefront fulfillment pipeline.
//!
//! Provides REST endpoints for carts, checkout, payment webhooks, orders
//! and catalog administration, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products/{id}", get(routes::products::get))
        .route("/products/{id}/related", get(routes::products::related))
        .route("/cart", get(routes::cart::view).delete(routes::cart::clear))
        .route("/cart/add", post(routes::cart::add))
        .route("/cart/remove", post(routes::cart::remove))
        .route("/cart/valid", get(routes::cart::validate))
        .route("/cart/{product_id}", delete(routes::cart::delete_product))
        .route("/payment/summary", get(routes::payment::summary))
        .route("/payment/create", post(routes::payment::create))
        .route("/payment/repay", post(routes::payment::repay))
        .route("/payment/cancel", delete(routes::payment::cancel))
        .route("/payment/webhook", post(routes::payment::webhook))
        .route("/orders", get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/orders/{id}/refund", post(routes::orders::refund))
        .route("/admin/orders", get(routes::admin::list_orders))
        .route("/admin/orders/{id}/cancel", post(routes::admin::cancel_order))
        .route("/admin/products/{id}", put(routes::admin::upsert_product))
        .route("/admin/products/{id}/stock", put(routes::admin::set_stock))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

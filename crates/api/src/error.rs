//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::FulfillmentError;
use store::StoreError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// No caller identity on the request.
    #[error("{0}")]
    Unauthorized(String),
    /// Caller lacks the admin role.
    #[error("{0}")]
    Forbidden(String),
    /// Cart, order or payment error.
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),
    /// Storage error from a direct catalog call.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Fulfillment(err) => fulfillment_status(err),
            ApiError::Store(err) => store_status(err),
        }
    }
}

fn fulfillment_status(err: &FulfillmentError) -> (StatusCode, &'static str) {
    match err {
        FulfillmentError::OutOfStock(_) => (StatusCode::CONFLICT, "OUT_OF_STOCK"),
        FulfillmentError::InsufficientStock(_) => (StatusCode::CONFLICT, "INSUFFICIENT_STOCK"),
        FulfillmentError::CartLocked => (StatusCode::CONFLICT, "CART_LOCKED"),
        FulfillmentError::CartNotReserved => (StatusCode::CONFLICT, "CART_NOT_RESERVED"),
        FulfillmentError::InvalidOrderState { .. } => (StatusCode::CONFLICT, "INVALID_ORDER_STATE"),
        FulfillmentError::PaymentSessionOpen { .. } => {
            (StatusCode::CONFLICT, "PAYMENT_SESSION_OPEN")
        }
        FulfillmentError::PaymentAlreadyCompleted(_) => {
            (StatusCode::CONFLICT, "PAYMENT_ALREADY_COMPLETED")
        }
        FulfillmentError::EmptyCart => (StatusCode::BAD_REQUEST, "EMPTY_CART"),
        FulfillmentError::InvalidOrder(_) => (StatusCode::BAD_REQUEST, "INVALID_ORDER"),
        FulfillmentError::SignatureInvalid(_) => (StatusCode::BAD_REQUEST, "SIGNATURE_INVALID"),
        FulfillmentError::InvalidWebhookPayload(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
        FulfillmentError::RefundWindowExpired => {
            (StatusCode::UNPROCESSABLE_ENTITY, "REFUND_WINDOW_EXPIRED")
        }
        FulfillmentError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND"),
        FulfillmentError::NotInCart(_) => (StatusCode::NOT_FOUND, "NOT_IN_CART"),
        FulfillmentError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
        FulfillmentError::CustomerNotFound(_) => (StatusCode::NOT_FOUND, "CUSTOMER_NOT_FOUND"),
        FulfillmentError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        FulfillmentError::PaymentProvider { .. } => (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER"),
        FulfillmentError::Notification(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        FulfillmentError::Store(err) => store_status(err),
    }
}

fn store_status(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND"),
        StoreError::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_ORDER_STATE"),
        StoreError::DuplicateSession(_) => (StatusCode::CONFLICT, "DUPLICATE_SESSION"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        metrics::counter!("http_errors_total", "code" => code).increment(1);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
            "internal server error".to_string()
        } else {
            if status.is_server_error() {
                tracing::warn!(error = %self, "upstream failure");
            }
            self.to_string()
        };

        let mut body = serde_json::json!({ "error": message, "code": code });
        if let ApiError::Fulfillment(err) = &self
            && err.is_retryable()
        {
            body["retryable"] = serde_json::Value::Bool(true);
        }
        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for handler results.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use common::ProductId;
    use domain::OrderStatus;

    use super::*;

    #[test]
    fn stock_and_state_errors_conflict() {
        let err = ApiError::from(FulfillmentError::OutOfStock(ProductId::new("A")));
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);

        let err = ApiError::from(FulfillmentError::PaymentAlreadyCompleted(OrderStatus::Shipping));
        assert_eq!(err.status_and_code().1, "PAYMENT_ALREADY_COMPLETED");
    }

    #[test]
    fn refund_window_is_unprocessable() {
        let err = ApiError::from(FulfillmentError::RefundWindowExpired);
        assert_eq!(err.status_and_code().0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn store_errors_inside_fulfillment_are_internal() {
        let err = ApiError::from(FulfillmentError::Store(StoreError::Corrupt("bad row".into())));
        assert_eq!(err.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

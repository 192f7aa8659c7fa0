use common::ProductId;
use domain::OrderError;
use thiserror::Error;

/// Errors that can occur when interacting with a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Returning units would push the stock counter past its range.
    #[error("Stock counter overflow for product: {0}")]
    StockOverflow(ProductId),

    /// Another order already holds this payment session id.
    #[error("Payment session already attached to another order: {0}")]
    DuplicateSession(String),

    /// A status change that the order state machine does not allow.
    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] OrderError),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A Redis error occurred.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

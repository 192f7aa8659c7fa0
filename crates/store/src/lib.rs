//! Storage layer for the fulfillment pipeline.
//!
//! Every store is a trait with an in-memory implementation for tests and
//! local runs:
//! - [`InventoryStore`] and [`Catalog`] over the durable products table
//! - [`CartStore`] for volatile per-user carts (Redis in production)
//! - [`OrderStore`] with compare-and-set status transitions (PostgreSQL)

pub mod cart;
pub mod catalog;
pub mod error;
pub mod inventory;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod redis_store;

pub use cart::CartStore;
pub use catalog::{Catalog, Product};
pub use error::{Result, StoreError};
pub use inventory::InventoryStore;
pub use memory::{InMemoryCartStore, InMemoryInventory, InMemoryOrderStore};
pub use order::{OrderPage, OrderQuery, OrderStore};
pub use postgres::{PostgresInventory, PostgresOrderStore, connect_pool, run_migrations};
pub use redis_store::RedisCartStore;

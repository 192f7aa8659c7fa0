//! Shared handler state.

use std::sync::Arc;

use fulfillment::{CartService, FulfillmentSystem, OrderService, PaymentOrchestrator};
use store::{Catalog, InventoryStore};

/// Services shared by all handlers.
pub struct AppState {
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentOrchestrator>,
    pub catalog: Arc<dyn Catalog>,
    pub inventory: Arc<dyn InventoryStore>,
}

impl AppState {
    pub fn from_system(system: &FulfillmentSystem) -> Arc<Self> {
        Arc::new(Self {
            carts: Arc::clone(&system.carts),
            orders: Arc::clone(&system.orders),
            payments: Arc::clone(&system.payments),
            catalog: Arc::clone(&system.catalog),
            inventory: Arc::clone(&system.inventory),
        })
    }
}

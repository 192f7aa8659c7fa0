//! Customer profile lookup.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::UserId;
use domain::ShippingAddress;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Contact and shipping details remembered for checkout prefill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub shipping_address: Option<ShippingAddress>,
}

/// Trait for the customer directory owned by the user service.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find(&self, user_id: UserId) -> Result<Option<Customer>>;

    /// Creates or replaces the customer record.
    async fn save(&self, customer: &Customer) -> Result<()>;
}

/// In-memory customer directory for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustomerDirectory {
    customers: Arc<RwLock<HashMap<UserId, Customer>>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn customer_count(&self) -> usize {
        self.customers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn find(&self, user_id: UserId) -> Result<Option<Customer>> {
        Ok(self
            .customers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned())
    }

    async fn save(&self, customer: &Customer) -> Result<()> {
        self.customers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(customer.user_id, customer.clone());
        Ok(())
    }
}

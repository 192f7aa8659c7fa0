//! Wiring of the fulfillment services over a set of backends.

use std::sync::Arc;

use store::{
    CartStore, Catalog, InMemoryCartStore, InMemoryInventory, InMemoryOrderStore, InventoryStore,
    OrderStore,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cart_service::CartService;
use crate::clock::{Clock, SystemClock};
use crate::order_service::OrderService;
use crate::payment::PaymentOrchestrator;
use crate::scheduler::{LifecyclePolicy, RandomCarrierPolicy, Scheduler, SchedulerIntervals};
use crate::services::{
    AccountDirectory, CustomerDirectory, InMemoryAccountDirectory, InMemoryCustomerDirectory,
    InMemoryPaymentProvider, LoggingNotifier, Notifier, PaymentProvider,
};
use crate::settings::FulfillmentSettings;
use crate::webhook::WebhookVerifier;

/// Storage and collaborator implementations the services run on.
#[derive(Clone)]
pub struct Backends {
    pub carts: Arc<dyn CartStore>,
    pub inventory: Arc<dyn InventoryStore>,
    pub catalog: Arc<dyn Catalog>,
    pub orders: Arc<dyn OrderStore>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub provider: Arc<dyn PaymentProvider>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// Everything in memory, with a logging notifier and a fake provider.
    pub fn in_memory() -> Self {
        let inventory = InMemoryInventory::new();
        Self {
            carts: Arc::new(InMemoryCartStore::new()),
            inventory: Arc::new(inventory.clone()),
            catalog: Arc::new(inventory),
            orders: Arc::new(InMemoryOrderStore::new()),
            customers: Arc::new(InMemoryCustomerDirectory::new()),
            accounts: Arc::new(InMemoryAccountDirectory::new()),
            notifier: Arc::new(LoggingNotifier),
            provider: Arc::new(InMemoryPaymentProvider::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

/// The cart, order and payment services plus the scheduler, sharing one set
/// of backends.
pub struct FulfillmentSystem {
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentOrchestrator>,
    pub scheduler: Arc<Scheduler>,
    pub catalog: Arc<dyn Catalog>,
    pub inventory: Arc<dyn InventoryStore>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl FulfillmentSystem {
    /// Builds the services with the random carrier lifecycle policy.
    pub fn new(
        backends: Backends,
        settings: FulfillmentSettings,
        verifier: WebhookVerifier,
    ) -> Self {
        let policy = Arc::new(RandomCarrierPolicy::new(settings.annul_probability));
        Self::with_policy(backends, settings, verifier, policy)
    }

    pub fn with_policy(
        backends: Backends,
        settings: FulfillmentSettings,
        verifier: WebhookVerifier,
        policy: Arc<dyn LifecyclePolicy>,
    ) -> Self {
        let carts = Arc::new(CartService::new(
            backends.carts,
            Arc::clone(&backends.inventory),
            Arc::clone(&backends.catalog),
            Arc::clone(&backends.clock),
            settings.reservation_ttl,
        ));
        let orders = Arc::new(OrderService::new(
            backends.orders,
            Arc::clone(&backends.inventory),
            backends.notifier,
            Arc::clone(&backends.clock),
            settings.clone(),
        ));
        let payments = Arc::new(PaymentOrchestrator::new(
            Arc::clone(&carts),
            Arc::clone(&orders),
            backends.customers,
            backends.provider,
            verifier,
            Arc::clone(&backends.clock),
            settings.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&carts),
            Arc::clone(&orders),
            backends.accounts,
            policy,
            backends.clock,
            SchedulerIntervals {
                sweep: settings.sweep_interval,
                lifecycle: settings.lifecycle_interval,
                accounts: settings.account_cleanup_interval,
            },
        ));
        let (shutdown, _) = watch::channel(false);

        Self {
            carts,
            orders,
            payments,
            scheduler,
            catalog: backends.catalog,
            inventory: backends.inventory,
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Starts the periodic jobs.
    pub fn start_scheduler(&mut self) {
        if !self.handles.is_empty() {
            return;
        }
        self.handles = Arc::clone(&self.scheduler).spawn(self.shutdown.subscribe());
        tracing::info!(jobs = self.handles.len(), "scheduler started");
    }

    /// Signals the jobs to stop and waits for them.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down fulfillment system...");
        // Receivers may already be gone if the jobs exited.
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = ?e, "scheduler task failed");
            }
        }
        tracing::info!("Fulfillment system shutdown complete.");
    }
}

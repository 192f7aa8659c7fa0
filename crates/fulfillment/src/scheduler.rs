//! Periodic reconciliation jobs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use domain::OrderStatus;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cart_service::CartService;
use crate::clock::Clock;
use crate::error::Result;
use crate::order_service::{LifecycleReport, OrderService};
use crate::services::AccountDirectory;

/// Chooses the next status for a paid order during lifecycle advancement.
pub trait LifecyclePolicy: Send + Sync {
    /// `None` leaves the order where it is.
    fn next_status(&self, current: OrderStatus) -> Option<OrderStatus>;
}

/// Simulated carrier: usually advances, occasionally annuls.
#[derive(Debug, Clone, Copy)]
pub struct RandomCarrierPolicy {
    annul_probability: f64,
}

impl RandomCarrierPolicy {
    pub fn new(annul_probability: f64) -> Self {
        Self {
            annul_probability: annul_probability.clamp(0.0, 1.0),
        }
    }
}

impl LifecyclePolicy for RandomCarrierPolicy {
    fn next_status(&self, current: OrderStatus) -> Option<OrderStatus> {
        let next = current.next_in_lifecycle()?;
        if rand::thread_rng().gen_bool(self.annul_probability) {
            Some(OrderStatus::Annulled)
        } else {
            Some(next)
        }
    }
}

/// Always takes the next lifecycle step.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAdvance;

impl LifecyclePolicy for AlwaysAdvance {
    fn next_status(&self, current: OrderStatus) -> Option<OrderStatus> {
        current.next_in_lifecycle()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub carts_released: usize,
    pub orders_expired: usize,
}

/// Runs the expiry sweep, lifecycle advancement and account cleanup.
pub struct Scheduler {
    carts: Arc<CartService>,
    orders: Arc<OrderService>,
    accounts: Arc<dyn AccountDirectory>,
    policy: Arc<dyn LifecyclePolicy>,
    clock: Arc<dyn Clock>,
    intervals: SchedulerIntervals,
}

/// How often each job fires.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerIntervals {
    pub sweep: Duration,
    pub lifecycle: Duration,
    pub accounts: Duration,
}

impl Scheduler {
    pub fn new(
        carts: Arc<CartService>,
        orders: Arc<OrderService>,
        accounts: Arc<dyn AccountDirectory>,
        policy: Arc<dyn LifecyclePolicy>,
        clock: Arc<dyn Clock>,
        intervals: SchedulerIntervals,
    ) -> Self {
        Self {
            carts,
            orders,
            accounts,
            policy,
            clock,
            intervals,
        }
    }

    /// Releases abandoned reservations and deletes unpaid orders.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired_reservations(&self) -> Result<SweepReport> {
        let carts_released = self.carts.expire_reservations().await?;
        let orders_expired = self.orders.expire_unpaid_orders().await?;
        Ok(SweepReport {
            carts_released,
            orders_expired,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn advance_order_lifecycle(&self) -> Result<LifecycleReport> {
        self.orders.advance_lifecycle(self.policy.as_ref()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn purge_inactive_accounts(&self) -> Result<usize> {
        let purged = self
            .accounts
            .purge_expired_registrations(self.clock.now())
            .await?;
        if purged > 0 {
            tracing::info!(purged, "inactive accounts removed");
        }
        Ok(purged)
    }

    /// Starts one task per job. Each stops when `shutdown` flips to `true`.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let sweep = Arc::clone(&self);
        let lifecycle = Arc::clone(&self);
        let accounts = self;

        vec![
            tokio::spawn(run_every(
                "expired_reservations",
                sweep.intervals.sweep,
                shutdown.clone(),
                move || {
                    let scheduler = Arc::clone(&sweep);
                    async move { scheduler.sweep_expired_reservations().await.map(|_| ()) }
                },
            )),
            tokio::spawn(run_every(
                "order_lifecycle",
                lifecycle.intervals.lifecycle,
                shutdown.clone(),
                move || {
                    let scheduler = Arc::clone(&lifecycle);
                    async move { scheduler.advance_order_lifecycle().await.map(|_| ()) }
                },
            )),
            tokio::spawn(run_every(
                "inactive_accounts",
                accounts.intervals.accounts,
                shutdown,
                move || {
                    let scheduler = Arc::clone(&accounts);
                    async move { scheduler.purge_inactive_accounts().await.map(|_| ()) }
                },
            )),
        ]
    }
}

/// Fires `job` on a fixed interval until shutdown. Errors are logged and the
/// next tick runs as usual.
async fn run_every<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    job: F,
) where
    F: Fn() -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                metrics::counter!("scheduler_runs_total", "job" => name).increment(1);
                if let Err(e) = job().await {
                    metrics::counter!("scheduler_failures_total", "job" => name).increment(1);
                    tracing::error!(job = name, error = %e, "scheduled job failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!(job = name, "scheduler job stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_advance_follows_lifecycle() {
        assert_eq!(
            AlwaysAdvance.next_status(OrderStatus::Processing),
            Some(OrderStatus::Shipping)
        );
        assert_eq!(
            AlwaysAdvance.next_status(OrderStatus::Shipping),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(AlwaysAdvance.next_status(OrderStatus::Delivered), None);
    }

    #[test]
    fn certain_annulment_annuls_only_moving_orders() {
        let policy = RandomCarrierPolicy::new(1.0);
        assert_eq!(
            policy.next_status(OrderStatus::Processing),
            Some(OrderStatus::Annulled)
        );
        assert_eq!(policy.next_status(OrderStatus::Created), None);
    }

    #[test]
    fn probability_is_clamped() {
        let policy = RandomCarrierPolicy::new(7.0);
        assert_eq!(
            policy.next_status(OrderStatus::Shipping),
            Some(OrderStatus::Annulled)
        );
        let never = RandomCarrierPolicy::new(-1.0);
        assert_eq!(
            never.next_status(OrderStatus::Shipping),
            Some(OrderStatus::Delivered)
        );
    }
}

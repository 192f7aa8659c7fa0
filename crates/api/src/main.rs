//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::Config;
use fulfillment::services::StripeClient;
use fulfillment::{Backends, FulfillmentSystem, WebhookVerifier};
use store::{PostgresInventory, PostgresOrderStore, RedisCartStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Picks PostgreSQL, Redis and the HTTP payment provider when configured,
/// in-memory implementations otherwise.
async fn build_backends(config: &Config) -> Backends {
    let mut backends = Backends::in_memory();

    if let Some(url) = &config.database_url {
        let pool = store::connect_pool(url, config.database_max_connections)
            .await
            .expect("failed to connect to PostgreSQL");
        store::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let inventory = Arc::new(PostgresInventory::new(pool.clone()));
        backends.inventory = inventory.clone();
        backends.catalog = inventory;
        backends.orders = Arc::new(PostgresOrderStore::new(pool));
        tracing::info!("using PostgreSQL for products and orders");
    }

    if let Some(url) = &config.redis_url {
        let carts = RedisCartStore::connect(url, Some(&config.redis_key_prefix))
            .await
            .expect("failed to connect to Redis");
        backends.carts = Arc::new(carts);
        tracing::info!("using Redis for carts");
    }

    if let Some(key) = &config.stripe_api_key {
        let client = StripeClient::new(
            key.as_str(),
            config.stripe_api_base.as_str(),
            Duration::from_secs(config.provider_timeout_secs),
        )
        .expect("failed to build payment provider client");
        backends.provider = Arc::new(client);
        tracing::info!(base = %config.stripe_api_base, "using HTTP payment provider");
    } else {
        tracing::warn!("STRIPE_API_KEY not set, payments use the in-memory provider");
    }

    backends
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire the fulfillment services and start the scheduler
    let backends = build_backends(&config).await;
    let verifier = WebhookVerifier::new(config.webhook_secret.clone(), config.webhook_tolerance());
    let mut system = FulfillmentSystem::new(backends, config.fulfillment_settings(), verifier);
    system.start_scheduler();

    // 4. Build the application
    let app = api::create_app(api::AppState::from_system(&system), metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 6. Stop background jobs
    system.shutdown().await;
    tracing::info!("server shut down gracefully");
}

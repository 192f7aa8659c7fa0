//! Redis cart store integration tests
//!
//! Run with:
//!
//! ```bash
//! cargo test -p store --test redis_integration
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{ProductId, UserId};
use domain::Cart;
use store::{CartStore, RedisCartStore};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::{REDIS_PORT, Redis};
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Redis>,
    url: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Redis::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(REDIS_PORT).await.unwrap();
            Arc::new(ContainerInfo {
                container,
                url: format!("redis://{}:{}", host, port),
            })
        })
        .await
        .clone()
}

/// Each test gets its own key prefix instead of flushing the database.
async fn get_test_store() -> RedisCartStore {
    get_prefixed_store(&format!("test-{}", uuid::Uuid::new_v4())).await
}

async fn get_prefixed_store(prefix: &str) -> RedisCartStore {
    let info = get_container_info().await;
    RedisCartStore::connect(&info.url, Some(prefix))
        .await
        .unwrap()
}

async fn raw_connection() -> redis::aio::MultiplexedConnection {
    let info = get_container_info().await;
    redis::Client::open(info.url.as_str())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap()
}

#[tokio::test]
async fn put_get_and_delete_cart() {
    let store = get_test_store().await;
    let user = UserId::new();
    let mut cart = Cart::new(user, Utc::now());
    cart.add_one(ProductId::new("A"), Utc::now()).unwrap();
    cart.lock(Utc::now());

    store.put(&cart).await.unwrap();
    let loaded = store.get(user).await.unwrap().unwrap();
    assert_eq!(loaded, cart);
    assert!(loaded.is_locked());

    assert!(store.delete(user).await.unwrap());
    assert!(!store.delete(user).await.unwrap());
    assert!(store.get(user).await.unwrap().is_none());
}

#[tokio::test]
async fn list_returns_indexed_carts() {
    let store = get_test_store().await;
    for _ in 0..3 {
        let mut cart = Cart::new(UserId::new(), Utc::now());
        cart.add_one(ProductId::new("A"), Utc::now()).unwrap();
        store.put(&cart).await.unwrap();
    }
    let carts = store.list().await.unwrap();
    assert_eq!(carts.len(), 3);

    store.delete(carts[0].user_id()).await.unwrap();
    assert_eq!(store.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn list_skips_and_quarantines_undecodable_cart() {
    let prefix = format!("test-{}", uuid::Uuid::new_v4());
    let store = get_prefixed_store(&prefix).await;

    let mut healthy = Cart::new(UserId::new(), Utc::now());
    healthy.add_one(ProductId::new("A"), Utc::now()).unwrap();
    healthy.lock(Utc::now());
    store.put(&healthy).await.unwrap();

    let broken = UserId::new();
    let mut conn = raw_connection().await;
    let _: () = redis::cmd("SET")
        .arg(format!("{prefix}:cart:{broken}"))
        .arg("{not a cart")
        .query_async(&mut conn)
        .await
        .unwrap();
    let _: () = redis::cmd("SADD")
        .arg(format!("{prefix}:carts"))
        .arg(broken.to_string())
        .query_async(&mut conn)
        .await
        .unwrap();

    let carts = store.list().await.unwrap();
    assert_eq!(carts, vec![healthy.clone()]);

    let moved: Option<String> = redis::cmd("GET")
        .arg(format!("{prefix}:corrupt-cart:{broken}"))
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(moved.as_deref(), Some("{not a cart"));
    assert!(store.get(broken).await.unwrap().is_none());
    assert_eq!(store.list().await.unwrap(), vec![healthy]);
}

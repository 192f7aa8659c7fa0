//! Redis cart store.

use async_trait::async_trait;
use common::UserId;
use domain::Cart;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::{debug, error, info, warn};

use crate::{CartStore, Result};

/// Carts stored as JSON strings under `{prefix}:cart:{user_id}`.
///
/// A set at `{prefix}:carts` indexes the user ids with a cart so sweeps do
/// not need to scan the keyspace.
#[derive(Clone)]
pub struct RedisCartStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisCartStore {
    /// Connects to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    /// * `key_prefix` - Prefix for all keys (default: "shop")
    pub async fn connect(url: &str, key_prefix: Option<&str>) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "Connected to Redis for carts");

        Ok(Self {
            conn,
            key_prefix: key_prefix.unwrap_or("shop").to_string(),
        })
    }

    fn cart_key(&self, user_id: UserId) -> String {
        format!("{}:cart:{}", self.key_prefix, user_id)
    }

    fn index_key(&self) -> String {
        format!("{}:carts", self.key_prefix)
    }

    fn quarantine_key(&self, user_id: UserId) -> String {
        format!("{}:corrupt-cart:{}", self.key_prefix, user_id)
    }

    /// Moves an undecodable cart out of the index so sweeps keep running.
    async fn quarantine(&self, conn: &mut ConnectionManager, user_id: UserId) -> Result<()> {
        let _: () = redis::pipe()
            .atomic()
            .rename(self.cart_key(user_id), self.quarantine_key(user_id))
            .ignore()
            .srem(self.index_key(), user_id.to_string())
            .ignore()
            .query_async(conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CartStore for RedisCartStore {
    async fn get(&self, user_id: UserId) -> Result<Option<Cart>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(self.cart_key(user_id)).await?;
        json.map(|j| serde_json::from_str(&j).map_err(Into::into))
            .transpose()
    }

    async fn put(&self, cart: &Cart) -> Result<()> {
        let json = serde_json::to_string(cart)?;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .set(self.cart_key(cart.user_id()), json)
            .ignore()
            .sadd(self.index_key(), cart.user_id().to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(user_id = %cart.user_id(), "Stored cart in Redis");
        Ok(())
    }

    async fn delete(&self, user_id: UserId) -> Result<bool> {
        let mut conn = self.conn.clone();
        let (deleted, _): (u32, u32) = redis::pipe()
            .atomic()
            .del(self.cart_key(user_id))
            .srem(self.index_key(), user_id.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn list(&self) -> Result<Vec<Cart>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(self.index_key()).await?;
        let mut carts = Vec::with_capacity(members.len());

        for member in members {
            let Ok(user_id) = member.parse::<UserId>() else {
                warn!(member = %member, "Dropping malformed cart index entry");
                let _: () = conn.srem(self.index_key(), &member).await?;
                continue;
            };
            let json: Option<String> = conn.get(self.cart_key(user_id)).await?;
            match json {
                Some(json) => match serde_json::from_str(&json) {
                    Ok(cart) => carts.push(cart),
                    Err(e) => {
                        error!(%user_id, error = %e, "Quarantining undecodable cart");
                        self.quarantine(&mut conn, user_id).await?;
                    }
                },
                None => {
                    let _: () = conn.srem(self.index_key(), &member).await?;
                }
            }
        }
        Ok(carts)
    }
}

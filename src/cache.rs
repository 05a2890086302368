//! Cache-aside user lookup.
//!
//! The database stays the source of truth: entries expire after a fixed
//! delay and any cache failure is logged then treated as a miss.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::user::User;

/// Seconds.
pub const DEFAULT_EXPIRATION: u64 = 300;
const KEY_PREFIX: &str = "user:";

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<RwLock<HashMap<i64, (String, Instant)>>>),
    Disabled,
}

/// User cache shared across requests.
#[derive(Clone)]
pub struct UserCache {
    backend: Backend,
    expiration: Duration,
}

impl UserCache {
    /// Connect to Redis at `url`.
    pub async fn redis(
        url: &str,
        expiration: Duration,
    ) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        tracing::info!(%url, "redis connected");

        Ok(Self {
            backend: Backend::Redis(connection),
            expiration,
        })
    }

    /// In-process map, not shared between instances.
    pub fn memory(expiration: Duration) -> Self {
        Self {
            backend: Backend::Memory(Arc::new(RwLock::new(HashMap::new()))),
            expiration,
        }
    }

    /// Every lookup misses.
    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
            expiration: Duration::ZERO,
        }
    }

    pub async fn get(&self, id: i64) -> Option<User> {
        let json = match &self.backend {
            Backend::Redis(connection) => {
                let mut conn = connection.clone();
                match conn.get::<_, Option<String>>(key(id)).await {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!(error = %err, user_id = id, "cache get failed");
                        None
                    },
                }
            },
            Backend::Memory(map) => {
                let map = map.read().ok()?;
                map.get(&id)
                    .filter(|(_, expires_at)| *expires_at > Instant::now())
                    .map(|(json, _)| json.clone())
            },
            Backend::Disabled => None,
        }?;

        match serde_json::from_str(&json) {
            Ok(user) => {
                metrics::counter!("cache_hits_total").increment(1);
                Some(user)
            },
            Err(err) => {
                tracing::warn!(error = %err, user_id = id, "corrupted cache entry");
                self.remove(id).await;
                None
            },
        }
    }

    pub async fn set(&self, user: &User) {
        let json = match serde_json::to_string(user) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, user_id = user.id, "cannot serialize user");
                return;
            },
        };

        match &self.backend {
            Backend::Redis(connection) => {
                let mut conn = connection.clone();
                if let Err(err) = conn
                    .set_ex::<_, _, ()>(key(user.id), json, self.expiration.as_secs())
                    .await
                {
                    tracing::warn!(error = %err, user_id = user.id, "cache set failed");
                }
            },
            Backend::Memory(map) => {
                if let Ok(mut map) = map.write() {
                    let now = Instant::now();
                    map.retain(|_, (_, expires_at)| *expires_at > now);
                    map.insert(user.id, (json, now + self.expiration));
                }
            },
            Backend::Disabled => {},
        }
    }

    pub async fn remove(&self, id: i64) {
        match &self.backend {
            Backend::Redis(connection) => {
                let mut conn = connection.clone();
                if let Err(err) = conn.del::<_, ()>(key(id)).await {
                    tracing::warn!(error = %err, user_id = id, "cache remove failed");
                }
            },
            Backend::Memory(map) => {
                if let Ok(mut map) = map.write() {
                    map.remove(&id);
                }
            },
            Backend::Disabled => {},
        }
    }
}

fn key(id: i64) -> String {
    format!("{KEY_PREFIX}{id}")
}

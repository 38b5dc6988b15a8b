//! Redis-backed key-value store.

use std::time::Duration;

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, IntoConnectionInfo, RedisConnectionInfo,
    aio::{ConnectionManager, ConnectionManagerConfig},
    sentinel::{Sentinel, SentinelNodeConnectionInfo},
};
use tracing::{debug, info, warn};

use crate::config::RedisConfig;
use crate::domain::repositories::{KeyValueStore, KvError, KvResult};

/// Unit applied to the backoff and timeout numbers in [`RedisConfig`].
pub const REDIS_TIMEOUT_UNIT: Duration = Duration::from_secs(60);

/// Redis store using a multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects in the configured mode and validates the connection with a PING.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Connection`] for an unsupported mode, an unreachable
    /// server or sentinel, or a failed PING.
    pub async fn connect(config: &RedisConfig) -> KvResult<Self> {
        let client = match config.mode.as_str() {
            "single" => single_client(config)?,
            "sentinel" => sentinel_client(config).await?,
            other => {
                return Err(KvError::Connection(format!(
                    "redis mode {other} is not supported"
                )));
            }
        };

        if config.pool_size.is_some() || config.network.is_some() {
            debug!("redis pool and network options are ignored by the multiplexed connection");
        }

        let conn = ConnectionManager::new_with_config(client, manager_config(config))
            .await
            .map_err(|e| KvError::Connection(format!("Failed to connect to Redis: {e}")))?;

        let store = Self { conn };
        store.ping().await?;

        info!(mode = %config.mode, "✓ Connected to Redis");
        Ok(store)
    }
}

fn with_scheme(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{address}")
    }
}

fn redis_settings(config: &RedisConfig) -> RedisConnectionInfo {
    let mut settings = RedisConnectionInfo::default();
    if let Some(username) = &config.username {
        settings = settings.set_username(username);
    }
    if let Some(password) = &config.password {
        settings = settings.set_password(password);
    }
    if let Some(db) = config.db {
        settings = settings.set_db(db);
    }
    settings
}

fn single_client(config: &RedisConfig) -> KvResult<Client> {
    let info = with_scheme(&config.address)
        .into_connection_info()
        .map_err(|e| KvError::Connection(format!("Invalid Redis address: {e}")))?
        .set_redis_settings(redis_settings(config));

    Client::open(info)
        .map_err(|e| KvError::Connection(format!("Failed to create Redis client: {e}")))
}

async fn sentinel_client(config: &RedisConfig) -> KvResult<Client> {
    let nodes: Vec<String> = config
        .sentinel_address
        .iter()
        .map(|a| with_scheme(a))
        .collect();

    let mut sentinel = Sentinel::build(nodes)
        .map_err(|e| KvError::Connection(format!("Invalid sentinel address: {e}")))?;

    let node_info =
        SentinelNodeConnectionInfo::default().set_redis_connection_info(redis_settings(config));

    sentinel
        .async_master_for(&config.master_name, Some(&node_info))
        .await
        .map_err(|e| {
            KvError::Connection(format!(
                "Failed to resolve master {}: {e}",
                config.master_name
            ))
        })
}

fn manager_config(config: &RedisConfig) -> ConnectionManagerConfig {
    let unit = |n: u64| REDIS_TIMEOUT_UNIT * u32::try_from(n).unwrap_or(u32::MAX);

    let mut cfg = ConnectionManagerConfig::new();
    if let Some(min) = config.min_retry_backoff {
        cfg = cfg.set_min_delay(unit(min));
    }
    if let Some(max) = config.max_retry_backoff {
        cfg = cfg.set_max_delay(unit(max));
    }
    if let Some(retries) = config.max_retries {
        cfg = cfg.set_number_of_retries(retries);
    }
    if let Some(dial) = config.dial_timeout {
        cfg = cfg.set_connection_timeout(Some(unit(dial)));
    }

    let io_timeout = match (config.read_timeout, config.write_timeout) {
        (Some(r), Some(w)) => Some(r.max(w)),
        (r, w) => r.or(w),
    };
    if let Some(timeout) = io_timeout {
        cfg = cfg.set_response_timeout(Some(unit(timeout)));
    }

    cfg
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key).await.map_err(|e| {
            warn!(key, error = %e, "Redis GET failed");
            KvError::Operation(e.to_string())
        })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| {
                warn!(key, error = %e, "Redis SET failed");
                KvError::Operation(e.to_string())
            })
    }

    async fn del(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.conn.clone();
        conn.del::<_, i64>(key)
            .await
            .map(|deleted| deleted > 0)
            .map_err(|e| {
                warn!(key, error = %e, "Redis DEL failed");
                KvError::Operation(e.to_string())
            })
    }

    async fn ping(&self) -> KvResult<()> {
        let mut conn = self.conn.clone();
        conn.ping::<()>()
            .await
            .map_err(|e| KvError::Connection(format!("Redis PING failed: {e}")))
    }
}

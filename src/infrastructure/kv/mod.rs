//! Key-value backends for token bindings.
//!
//! - [`RedisStore`] - Redis in single-node or sentinel mode
//! - [`MemoryStore`] - in-process map with expiry, for tests and local runs

mod memory_store;
mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::{REDIS_TIMEOUT_UNIT, RedisStore};

use std::sync::Arc;

use async_trait::async_trait;

use crate::api::handlers::health::HealthChecker;
use crate::domain::repositories::KeyValueStore;

/// Health checker that pings the key-value store.
pub struct KvChecker {
    name: String,
    store: Arc<dyn KeyValueStore>,
}

impl KvChecker {
    pub fn new(name: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

#[async_trait]
impl HealthChecker for KvChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> Result<(), String> {
        self.store.ping().await.map_err(|e| e.to_string())
    }
}

//! Key-value store contract used for token bindings.

use async_trait::async_trait;
use std::time::Duration;

/// Errors raised by key-value backends.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("key-value connection error: {0}")]
    Connection(String),
    #[error("key-value operation error: {0}")]
    Operation(String),
}

/// Result type for key-value operations.
pub type KvResult<T> = Result<T, KvError>;

/// String key-value store with per-key expiry.
///
/// Unlike a cache, failures are reported to the caller: a token check that
/// cannot reach the store must not succeed.
///
/// # Implementations
///
/// - [`crate::infrastructure::kv::RedisStore`] - Redis, single node or sentinel
/// - [`crate::infrastructure::kv::MemoryStore`] - in-process map for tests and local runs
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a key. `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Writes a key that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;

    /// Removes a key. Returns whether it existed.
    async fn del(&self, key: &str) -> KvResult<bool>;

    /// Round-trips to the backend; used by the health endpoint.
    async fn ping(&self) -> KvResult<()>;
}

//! Shared service bundle handed to every handler.

use std::sync::Arc;

use sqlx::PgPool;

use crate::api::handlers::HealthRegistry;
use crate::application::services::TokenService;
use crate::config::Settings;
use crate::domain::repositories::KeyValueStore;
use crate::infrastructure::kv::MemoryStore;
use crate::infrastructure::storage::ObjectStorage;

/// Clients built once at startup.
///
/// Optional members are `None` when the matching config section is absent.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: Option<PgPool>,
    pub kv: Arc<dyn KeyValueStore>,
    pub tokens: Option<Arc<TokenService>>,
    pub storage: Option<ObjectStorage>,
    pub health: HealthRegistry,
}

impl AppState {
    /// A bundle with only an in-memory key-value store.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            db: None,
            kv: Arc::new(MemoryStore::new()),
            tokens: None,
            storage: None,
            health: HealthRegistry::new(),
        }
    }

    pub fn with_kv(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = kv;
        self
    }

    pub fn with_tokens(mut self, tokens: TokenService) -> Self {
        self.tokens = Some(Arc::new(tokens));
        self
    }

    /// Value at a dot-separated config path, empty when absent.
    pub fn config_value(&self, key: &str) -> String {
        self.settings.get_value(key)
    }
}

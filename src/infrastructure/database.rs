//! PostgreSQL connection pool.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::info;

use crate::api::handlers::health::HealthChecker;
use crate::config::{SqlConfig, mask_connection_string};

/// Opens a pool sized from `poolingConnection` and verifies it with one query.
///
/// # Errors
///
/// Returns an error if the server is unreachable or rejects the credentials.
pub async fn connect(config: &SqlConfig) -> Result<PgPool> {
    let url = config.url();
    info!("Connecting to database at {}", mask_connection_string(&url));

    let connect_options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database);

    let pool = pool_options(config)
        .connect_with(connect_options)
        .await
        .context("Failed to open sql database connection")?;

    info!("✓ Database connection established");
    Ok(pool)
}

fn pool_options(config: &SqlConfig) -> PgPoolOptions {
    let mut options = PgPoolOptions::new();
    if let Some(pooling) = &config.pooling_connection {
        if let Some(max_open) = pooling.max_open.filter(|n| *n > 0) {
            options = options.max_connections(max_open);
        }
        if let Some(max_idle) = pooling.max_idle {
            options = options.min_connections(max_idle);
        }
        if let Some(lifetime) = pooling.max_lifetime.filter(|n| *n > 0) {
            options = options.max_lifetime(Duration::from_secs(lifetime));
        }
    }
    options
}

/// Health checker running `SELECT 1` against the pool.
pub struct SqlChecker {
    pool: PgPool,
}

impl SqlChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthChecker for SqlChecker {
    fn name(&self) -> &str {
        "sql"
    }

    async fn probe(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

//! Process bootstrap.
//!
//! [`start`] loads configuration, installs logging and telemetry, connects
//! every configured backend, hands the [`Server`] to the caller for route
//! registration and serves until Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;

use crate::application::services::TokenService;
use crate::config::Settings;
use crate::domain::repositories::KeyValueStore;
use crate::infrastructure::{
    database::{self, SqlChecker},
    kv::{KvChecker, MemoryStore, RedisStore},
    logger::{self, LoggerGuard},
    storage::{self, ObjectStorage},
    telemetry::{self, TelemetryGuard},
};
use crate::server::Server;
use crate::state::AppState;

/// Guards that must live until the process exits.
pub struct Runtime {
    pub state: AppState,
    pub telemetry: TelemetryGuard,
    _logger: LoggerGuard,
}

/// Boots the service, lets `setup` register routes, then serves until a
/// shutdown signal arrives.
///
/// Startup failures are logged and terminate the process with exit code 1.
pub async fn start<F>(setup: F)
where
    F: FnOnce(&mut Server),
{
    if let Err(e) = run(setup).await {
        let message = format!("{e:#}");
        tracing::error!(error = %message, "fatal error");
        eprintln!("fatal: {message}");
        std::process::exit(1);
    }
}

async fn run<F>(setup: F) -> Result<()>
where
    F: FnOnce(&mut Server),
{
    let settings = Settings::load()?;
    let runtime = bootstrap(settings).await?;

    let mut server = Server::new(runtime.state.clone());
    setup(&mut server);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut serving = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    let finished = tokio::select! {
        joined = &mut serving => Some(joined),
        () = shutdown_signal() => None,
    };

    let result = match finished {
        Some(joined) => {
            let result = joined.context("REST server task failed")?;
            // A disabled REST API returns at once; keep the process alive.
            if result.is_ok() {
                shutdown_signal().await;
            }
            result
        }
        None => {
            tracing::info!("Shutdown signal received");
            let _ = stop_tx.send(());
            serving.await.context("REST server task failed")?
        }
    };

    runtime.telemetry.shutdown();
    result
}

/// Builds every configured client in dependency order.
///
/// # Errors
///
/// Returns an error if a configured backend cannot be reached.
pub async fn bootstrap(settings: Settings) -> Result<Runtime> {
    let config = &settings.config;
    let stdout = config
        .server
        .rest_api
        .as_ref()
        .is_none_or(|rest| rest.stdout);
    let logger_guard = logger::init(&config.log, stdout)?;

    tracing::info!(app = %config.app.name, version = %config.app.version, "Starting");

    let telemetry = telemetry::init(&config.otel, &config.app.name, &config.app.version)?;

    let mut state = AppState::new(settings.clone());

    if let Some(sql) = &config.database.sql {
        let pool = database::connect(sql).await?;
        state.health.register(Arc::new(SqlChecker::new(pool.clone())));
        state.db = Some(pool);
    }

    let kv: Arc<dyn KeyValueStore> = match &config.database.redis {
        Some(redis) => {
            let store: Arc<dyn KeyValueStore> = Arc::new(
                RedisStore::connect(redis)
                    .await
                    .context("Failed to open redis connection")?,
            );
            state.health.register(Arc::new(KvChecker::new("redis", store.clone())));
            store
        }
        None => {
            tracing::warn!("Redis is not configured; token bindings are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };
    state = state.with_kv(kv.clone());

    if storage::is_enabled(config.storage.as_ref())
        && let Some(storage_config) = &config.storage
    {
        let storage = ObjectStorage::connect(storage_config)
            .await
            .context("Failed to initialize object storage")?;
        state.storage = Some(storage);
    }

    if let Some(token) = &config.token {
        let tokens = TokenService::from_config(token, config.app.name.clone(), kv)
            .context("Failed to initialize token service")?;
        state = state.with_tokens(tokens);
    }

    Ok(Runtime {
        state,
        telemetry,
        _logger: logger_guard,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

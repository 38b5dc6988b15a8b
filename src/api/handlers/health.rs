//! Health endpoint and checker registry.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{Json, extract::State, http::StatusCode};
use futures::future::join_all;
use tokio::time::{Instant, timeout_at};

use crate::api::dto::health::{CheckStatus, HealthResponse, STATUS_OK, STATUS_UNAVAILABLE};
use crate::state::AppState;

/// Deadline shared by all checkers of one health request.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// A dependency probed by `GET /_health`.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Key used in the `checks` map.
    fn name(&self) -> &str;

    /// Returns `Err` with a short reason when the dependency is unhealthy.
    async fn probe(&self) -> Result<(), String>;
}

/// Checker built from a name and an async probe function.
///
/// ```rust,ignore
/// let queue = FnChecker::new("queue", move || {
///     let client = client.clone();
///     async move { client.ping().await.map_err(|e| e.to_string()) }
/// });
/// ```
pub struct FnChecker<F> {
    name: String,
    probe: F,
}

impl<F> FnChecker<F> {
    pub fn new(name: impl Into<String>, probe: F) -> Self {
        Self {
            name: name.into(),
            probe,
        }
    }
}

#[async_trait]
impl<F, Fut> HealthChecker for FnChecker<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> Result<(), String> {
        (self.probe)().await
    }
}

/// Ordered set of checkers.
#[derive(Clone, Default)]
pub struct HealthRegistry {
    checkers: Vec<Arc<dyn HealthChecker>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, checker: Arc<dyn HealthChecker>) {
        tracing::debug!(checker = checker.name(), "health checker registered");
        self.checkers.push(checker);
    }

    pub fn names(&self) -> Vec<String> {
        self.checkers.iter().map(|c| c.name().to_string()).collect()
    }

    /// Probes every checker concurrently; checkers still running at the
    /// deadline are reported as timed out.
    pub async fn run(&self, limit: Duration) -> BTreeMap<String, CheckStatus> {
        let deadline = Instant::now() + limit;

        let probes = self.checkers.iter().map(|checker| async move {
            let status = match timeout_at(deadline, checker.probe()).await {
                Ok(Ok(())) => CheckStatus::ok(),
                Ok(Err(reason)) => CheckStatus::failed(reason),
                Err(_) => CheckStatus::failed("timeout"),
            };
            (checker.name().to_string(), status)
        });

        join_all(probes).await.into_iter().collect()
    }
}

/// Reports the health of every registered dependency.
///
/// # Endpoint
///
/// `GET /_health`
///
/// # Response Codes
///
/// - **200 OK**: all checkers succeeded
/// - **503 Service Unavailable**: at least one checker failed or timed out
///
/// # Response
///
/// ```json
/// {
///   "status": "Service Unavailable",
///   "checks": {
///     "redis": { "status": "OK" },
///     "sql": { "status": "Service Unavailable", "error": "timeout" }
///   }
/// }
/// ```
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let checks = state.health.run(HEALTH_TIMEOUT).await;
    let healthy = checks.values().all(CheckStatus::is_ok);

    if healthy {
        Ok(Json(HealthResponse {
            status: STATUS_OK.to_string(),
            checks,
        }))
    } else {
        for (name, check) in checks.iter().filter(|(_, c)| !c.is_ok()) {
            tracing::warn!(checker = %name, error = ?check.error, "health check failed");
        }
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: STATUS_UNAVAILABLE.to_string(),
                checks,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        result: Result<(), String>,
        delay: Duration,
    }

    #[async_trait]
    impl HealthChecker for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn probe(&self) -> Result<(), String> {
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    fn checker(name: &'static str, result: Result<(), String>, delay_ms: u64) -> Arc<dyn HealthChecker> {
        Arc::new(Fixed {
            name,
            result,
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let checks = HealthRegistry::new().run(HEALTH_TIMEOUT).await;
        assert!(checks.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_reported_per_checker() {
        let mut registry = HealthRegistry::new();
        registry.register(checker("sql", Ok(()), 0));
        registry.register(checker("redis", Err("connection refused".into()), 0));

        let checks = registry.run(HEALTH_TIMEOUT).await;
        assert_eq!(checks["sql"], CheckStatus::ok());
        assert_eq!(checks["redis"], CheckStatus::failed("connection refused"));
    }

    #[tokio::test]
    async fn test_fn_checker_runs_its_probe() {
        let mut registry = HealthRegistry::new();
        registry.register(Arc::new(FnChecker::new("queue", || async {
            Err::<(), _>("queue closed".to_string())
        })));

        assert_eq!(registry.names(), vec!["queue"]);
        let checks = registry.run(HEALTH_TIMEOUT).await;
        assert_eq!(checks["queue"], CheckStatus::failed("queue closed"));
    }

    #[tokio::test]
    async fn test_deadline_is_shared() {
        let mut registry = HealthRegistry::new();
        registry.register(checker("fast", Ok(()), 10));
        registry.register(checker("slow", Ok(()), 5_000));

        let started = std::time::Instant::now();
        let checks = registry.run(Duration::from_millis(100)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(checks["fast"].is_ok());
        assert_eq!(checks["slow"].error.as_deref(), Some("timeout"));
    }
}

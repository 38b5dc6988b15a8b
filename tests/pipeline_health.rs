mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Value, json};
use service_helper::api::handlers::HealthChecker;
use service_helper::infrastructure::kv::{KvChecker, MemoryStore};

struct Down;

#[async_trait]
impl HealthChecker for Down {
    fn name(&self) -> &str {
        "sql"
    }

    async fn probe(&self) -> Result<(), String> {
        Err("connection refused".to_string())
    }
}

#[tokio::test]
async fn test_health_without_checkers() {
    let state = common::create_test_state(json!({}));
    let server = common::test_server(state, |_| {});

    let response = server.get("/_health").await;

    response.assert_status_ok();
    response.assert_json(&json!({ "status": "OK", "checks": {} }));
}

#[tokio::test]
async fn test_health_reports_each_checker() {
    let mut state = common::create_test_state(json!({}));
    state
        .health
        .register(Arc::new(KvChecker::new("redis", Arc::new(MemoryStore::new()))));
    let server = common::test_server(state, |_| {});

    let response = server.get("/_health").await;

    response.assert_status_ok();
    response.assert_json(&json!({
        "status": "OK",
        "checks": { "redis": { "status": "OK" } }
    }));
}

#[tokio::test]
async fn test_failing_checker_makes_service_unavailable() {
    let mut state = common::create_test_state(json!({}));
    state
        .health
        .register(Arc::new(KvChecker::new("redis", Arc::new(MemoryStore::new()))));
    state.health.register(Arc::new(Down));
    let server = common::test_server(state, |_| {});

    let response = server.get("/_health").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json = response.json::<Value>();
    assert_eq!(json["status"], "Service Unavailable");
    assert_eq!(json["checks"]["redis"]["status"], "OK");
    assert_eq!(json["checks"]["sql"]["error"], "connection refused");
}

#[tokio::test]
async fn test_service_registered_checks_are_reported() {
    let state = common::create_test_state(json!({}));
    let server = common::test_server(state, |server| {
        server
            .add_checker(Arc::new(KvChecker::new("cache", Arc::new(MemoryStore::new()))))
            .add_check("queue", || async { Err::<(), _>("queue closed".to_string()) });
    });

    let response = server.get("/_health").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json = response.json::<Value>();
    assert_eq!(json["checks"]["cache"]["status"], "OK");
    assert_eq!(json["checks"]["queue"]["error"], "queue closed");
}

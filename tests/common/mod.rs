#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use chrono::Duration;
use serde_json::{Value, json};
use service_helper::application::services::token_service::{KeyPair, TokenSettings};
use service_helper::application::services::{TokenPair, TokenService};
use service_helper::config::Settings;
use service_helper::domain::repositories::KeyValueStore;
use service_helper::infrastructure::kv::MemoryStore;
use service_helper::server::Server;
use service_helper::state::AppState;

pub const ACCESS_PRIVATE: &str = include_str!("../fixtures/access_private.pem");
pub const ACCESS_PUBLIC: &str = include_str!("../fixtures/access_public.pem");
pub const REFRESH_PRIVATE: &str = include_str!("../fixtures/refresh_private.pem");
pub const REFRESH_PUBLIC: &str = include_str!("../fixtures/refresh_public.pem");

pub const ISSUER: &str = "pipeline-test";

/// Settings with `app.name` set and `overrides` merged at the top level.
pub fn settings(overrides: Value) -> Settings {
    let mut tree = json!({ "app": { "name": ISSUER, "version": "0.0.1" } });
    if let (Some(tree), Some(extra)) = (tree.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            tree.insert(key.clone(), value.clone());
        }
    }
    Settings::from_value(tree).unwrap()
}

pub fn token_service(store: Arc<dyn KeyValueStore>) -> TokenService {
    let access = KeyPair::from_pem("access", ACCESS_PRIVATE.as_bytes(), ACCESS_PUBLIC.as_bytes())
        .unwrap();
    let refresh =
        KeyPair::from_pem("refresh", REFRESH_PRIVATE.as_bytes(), REFRESH_PUBLIC.as_bytes())
            .unwrap();
    let settings = TokenSettings {
        issuer: ISSUER.to_string(),
        access_ttl: Duration::hours(1),
        refresh_ttl: Duration::hours(2),
    };
    TokenService::new(access, refresh, settings, store).unwrap()
}

/// State with an in-memory store and a token service bound to it.
pub fn create_test_state(overrides: Value) -> AppState {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    AppState::new(settings(overrides))
        .with_kv(store.clone())
        .with_tokens(token_service(store))
}

/// Test server over the full pipeline with routes added by `configure`.
pub fn test_server(state: AppState, configure: impl FnOnce(&mut Server)) -> TestServer {
    let mut server = Server::new(state);
    configure(&mut server);
    TestServer::new(server.into_router()).unwrap()
}

pub async fn issue(state: &AppState, subject: &str, abilities: &[&str]) -> TokenPair {
    state
        .tokens
        .as_ref()
        .unwrap()
        .generate(subject, abilities.iter().map(|a| a.to_string()).collect())
        .await
        .unwrap()
}

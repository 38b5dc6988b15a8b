//! REST server: route registration, pipeline assembly and the serve loop.

use std::future::Future;
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, middleware, routing::MethodRouter, routing::get};
use tokio::net::TcpListener;

use crate::api::handlers::{FnChecker, HealthChecker, health_handler};
use crate::api::middleware::auth::{self, AuthGuard};
use crate::config::RestApiConfig;
use crate::routes::pipeline;
use crate::state::AppState;
use crate::utils::validators;

/// Path of the built-in health endpoint.
pub const HEALTH_PATH: &str = "/_health";

/// Collects routes and serves them behind the request pipeline.
///
/// ```rust,ignore
/// let mut server = Server::new(state);
/// server
///     .route("/user", post(create_user))
///     .protected_route("/hello", get(hello), "");
/// server.run(shutdown_signal()).await?;
/// ```
pub struct Server {
    state: AppState,
    rest: Option<RestApiConfig>,
    router: Router<AppState>,
}

impl Server {
    /// Creates a server with `/_health` registered.
    ///
    /// Also installs the verifier address used by email validation.
    pub fn new(state: AppState) -> Self {
        let rest = state.settings.config.server.rest_api.clone();

        if let Some(email) = rest.as_ref().and_then(|r| r.verifier_email.as_deref())
            && !email.is_empty()
        {
            validators::set_verifier_email(email);
        }

        Self {
            state,
            rest,
            router: Router::new().route(HEALTH_PATH, get(health_handler)),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Adds a dependency to the `/_health` report.
    pub fn add_checker(&mut self, checker: Arc<dyn HealthChecker>) -> &mut Self {
        self.state.health.register(checker);
        self
    }

    /// Adds a named health probe given as an async function.
    pub fn add_check<F, Fut>(&mut self, name: &str, probe: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.add_checker(Arc::new(FnChecker::new(name, probe)))
    }

    /// Adds a public route.
    pub fn route(&mut self, path: &str, method_router: MethodRouter<AppState>) -> &mut Self {
        self.router = mem::take(&mut self.router).route(path, method_router);
        self
    }

    /// Adds a route that requires a valid access token carrying `permission`
    /// (`""` only requires authentication).
    pub fn protected_route(
        &mut self,
        path: &str,
        method_router: MethodRouter<AppState>,
        permission: &str,
    ) -> &mut Self {
        self.protected(Router::new().route(path, method_router), permission)
    }

    /// Merges `router`, guarding each of its routes with `permission`.
    pub fn protected(&mut self, router: Router<AppState>, permission: &str) -> &mut Self {
        let guard = AuthGuard::new(self.state.tokens.clone(), permission);
        let router = router.route_layer(middleware::from_fn_with_state(guard, auth::layer));
        self.merge(router)
    }

    /// Merges public routes.
    pub fn merge(&mut self, router: Router<AppState>) -> &mut Self {
        self.router = mem::take(&mut self.router).merge(router);
        self
    }

    /// `host:port` the server binds to, `None` when the REST API is disabled.
    pub fn address(&self) -> Option<String> {
        self.rest.as_ref().map(|r| format!("{}:{}", r.host, r.port))
    }

    /// Finished router with state and pipeline applied.
    pub fn into_router(self) -> Router {
        let cors = self.rest.and_then(|r| r.cors);
        pipeline(self.router.with_state(self.state), cors)
    }

    /// Serves until `shutdown` resolves.
    ///
    /// Returns immediately when `server.restAPI` is not configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the server fails.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(addr) = self.address() else {
            tracing::warn!("REST API is disabled");
            return Ok(());
        };

        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(%addr, error = %e, "Failed to run REST server");
                return Err(e).with_context(|| format!("Failed to bind {addr}"));
            }
        };
        tracing::info!("Listening on http://{addr}");

        let app = self.into_router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .context("REST server failed")?;

        tracing::info!("REST server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::json;
    use tower::ServiceExt;

    fn state(rest: serde_json::Value) -> AppState {
        let settings = Settings::from_value(json!({
            "app": { "name": "server-test" },
            "server": { "restAPI": rest },
        }))
        .unwrap();
        AppState::new(settings)
    }

    #[test]
    fn test_address_uses_host_and_port() {
        let server = Server::new(state(json!({ "host": "127.0.0.1", "port": 9091 })));
        assert_eq!(server.address().as_deref(), Some("127.0.0.1:9091"));
    }

    #[tokio::test]
    async fn test_health_route_is_registered() {
        let app = Server::new(state(json!({}))).into_router();

        let res = app
            .oneshot(Request::get(HEALTH_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_without_token_service_fails() {
        let mut server = Server::new(state(json!({})));
        server.protected_route("/secret", get(|| async {}), "");

        let res = server
            .into_router()
            .oneshot(
                Request::get("/secret")
                    .header("authorization", "Bearer x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let server = Server::new(state(json!({ "host": "127.0.0.1", "port": port })));
        assert!(server.run(std::future::pending()).await.is_err());
    }
}

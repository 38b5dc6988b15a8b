//! Pipeline assembly.
//!
//! Stages wrap the router outermost first:
//!
//! 1. Panic recovery
//! 2. Trace attach (`X-Trace-ID`)
//! 3. Request id (`X-Request-Id`)
//! 4. Compression (gzip)
//! 5. Access log
//! 6. CORS, only when configured
//! 7. Security headers
//! 8. Pagination parse
//! 9. Error stage, then success stage (both act after the handler)
//!
//! Handler panics are also caught right around the routes, so the 500 reply
//! still passes back through every stage above and carries its headers.
//! The outer recovery only sees panics raised by the stages themselves.
//!
//! Authentication is a route layer added per route by [`crate::server::Server`].

use std::sync::Arc;

use axum::{Router, middleware};
use tower_http::{
    compression::CompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
};

use crate::api::middleware::{access_log, cors, envelope, pagination, recover, security_headers, trace};
use crate::config::CorsConfig;

/// Wraps `router` in the request pipeline.
///
/// The last `.layer` call is the outermost stage.
pub fn pipeline(router: Router, cors_config: Option<CorsConfig>) -> Router {
    let router = router
        .layer(recover::layer())
        .layer(middleware::from_fn(envelope::success_stage))
        .layer(middleware::from_fn(envelope::error_stage))
        .layer(middleware::from_fn(pagination::layer))
        .layer(middleware::from_fn(security_headers::layer));

    let router = match cors_config {
        Some(config) => router.layer(middleware::from_fn_with_state(
            Arc::new(config),
            cors::layer,
        )),
        None => {
            tracing::debug!("CORS not configured; stage skipped");
            router
        }
    };

    router
        .layer(middleware::from_fn(access_log::layer))
        .layer(CompressionLayer::new())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(middleware::from_fn(trace::layer))
        .layer(recover::layer())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    async fn boom() -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn test_panic_is_recovered() {
        let app = pipeline(Router::new().route("/boom", get(boom)), None);

        let res = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.headers().get("x-request-id").unwrap().len(), 36);
        assert_eq!(res.headers().get("x-trace-id").unwrap().len(), 32);
        assert_eq!(res.headers().get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(res.headers().get("x-frame-options").unwrap(), "DENY");
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_request_id_is_generated_and_propagated() {
        let app = pipeline(Router::new().route("/", get(|| async {})), None);

        let res = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let generated = res.headers().get("x-request-id").unwrap();
        assert_eq!(generated.len(), 36);

        let res = app
            .oneshot(
                Request::get("/")
                    .header("x-request-id", "caller-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.headers().get("x-request-id").unwrap(), "caller-id");
    }
}

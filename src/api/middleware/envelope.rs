//! Post-handler stages that turn the request bag into the reply envelope.
//!
//! The error stage sits outside the success stage, so on the way out the
//! success stage runs first. Both look at the bag; at most one of them writes.

use axum::{
    Json,
    body::Body,
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body::Body as _;

use crate::api::context::RequestBag;
use crate::api::dto::envelope::Envelope;

/// Replaces the response with the last error recorded in the bag, if any.
pub async fn error_stage(req: Request, next: Next) -> Response {
    let bag = req.extensions().get::<RequestBag>().cloned();
    let response = next.run(req).await;

    match bag.and_then(|bag| bag.take_last_error()) {
        Some(error) => error.into_response(),
        None => response,
    }
}

/// Writes the success envelope when the handler recorded no errors and left
/// the body empty with a 200 status.
pub async fn success_stage(req: Request, next: Next) -> Response {
    let bag = req.extensions().get::<RequestBag>().cloned();
    let response = next.run(req).await;

    let Some(bag) = bag else {
        return response;
    };
    if bag.has_errors()
        || response.status() != StatusCode::OK
        || response.body().size_hint().exact() != Some(0)
    {
        return response;
    }

    let (data, page) = bag.take_output();
    let envelope = Envelope::success(data, page);

    let body = match serde_json::to_vec(&envelope) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode success envelope");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Envelope::failure(crate::error::INTERNAL_MESSAGE, Vec::new())),
            )
                .into_response();
        }
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, Body::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::pagination::{PageRequest, PageResponse};
    use crate::error::AppError;
    use axum::{Router, middleware, routing::get};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn open_bag(mut req: Request, next: Next) -> Response {
        req.extensions_mut().insert(RequestBag::new(PageRequest::default()));
        next.run(req).await
    }

    fn app(router: Router) -> Router {
        router
            .layer(middleware::from_fn(success_stage))
            .layer(middleware::from_fn(error_stage))
            .layer(middleware::from_fn(open_bag))
    }

    async fn call(app: Router) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_success_envelope_carries_data_and_page() {
        let router = Router::new().route(
            "/",
            get(|bag: RequestBag| async move {
                bag.set_data(json!([1, 2]));
                bag.set_pagination(PageResponse::new(2, 10));
            }),
        );

        let (status, body) = call(app(router)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "message": "Success", "data": [1, 2], "page": { "totalPage": 1, "totalRecord": 2 } })
        );
    }

    #[tokio::test]
    async fn test_empty_handler_gets_bare_success() {
        let router = Router::new().route("/", get(|| async {}));
        let (status, body) = call(app(router)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Success" }));
    }

    #[tokio::test]
    async fn test_recorded_error_wins_over_data() {
        let router = Router::new().route(
            "/",
            get(|bag: RequestBag| async move {
                bag.set_data("ignored");
                bag.record_error(AppError::not_found("user", json!({})));
            }),
        );

        let (status, body) = call(app(router)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "message": "Data not found" }));
    }

    #[tokio::test]
    async fn test_handler_body_is_left_alone() {
        let router = Router::new().route("/", get(|| async { Json(json!({ "raw": true })) }));
        let (status, body) = call(app(router)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "raw": true }));
    }

    #[tokio::test]
    async fn test_non_200_empty_response_is_left_alone() {
        let router = Router::new().route("/", get(|| async { StatusCode::ACCEPTED }));
        let (status, body) = call(app(router)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, Value::Null);
    }
}

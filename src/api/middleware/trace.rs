//! Trace correlation stage.
//!
//! Continues the caller's trace (W3C `traceparent`) with a server span named
//! after the request path and reports its trace id in `X-Trace-ID`.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use opentelemetry::{
    KeyValue, global,
    trace::{FutureExt, SpanKind, Status, TraceContextExt, Tracer},
};
use opentelemetry_semantic_conventions::trace::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, URL_PATH,
};

use crate::infrastructure::telemetry::{INSTRUMENTATION_NAME, extract_context};

pub const X_TRACE_ID: HeaderName = HeaderName::from_static("x-trace-id");

/// Trace and span ids of the request span, for log correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceIds {
    pub trace_id: String,
    pub span_id: String,
}

pub async fn layer(mut req: Request, next: Next) -> Response {
    let parent = extract_context(req.headers());
    let path = req.uri().path().to_string();

    let tracer = global::tracer(INSTRUMENTATION_NAME);
    let span = tracer
        .span_builder(path.clone())
        .with_kind(SpanKind::Server)
        .with_attributes([
            KeyValue::new(HTTP_REQUEST_METHOD, req.method().to_string()),
            KeyValue::new(URL_PATH, path),
        ])
        .start_with_context(&tracer, &parent);

    let cx = parent.with_span(span);
    let span_context = cx.span().span_context().clone();
    let ids = TraceIds {
        trace_id: span_context.trace_id().to_string(),
        span_id: span_context.span_id().to_string(),
    };
    req.extensions_mut().insert(ids.clone());

    let mut response = next.run(req).with_context(cx.clone()).await;

    let status = response.status();
    let span = cx.span();
    span.set_attribute(KeyValue::new(
        HTTP_RESPONSE_STATUS_CODE,
        i64::from(status.as_u16()),
    ));
    if status.is_server_error() {
        span.set_status(Status::error(status.to_string()));
    }
    span.end();

    if let Ok(value) = HeaderValue::from_str(&ids.trace_id) {
        response.headers_mut().insert(X_TRACE_ID, value);
    }
    response
}

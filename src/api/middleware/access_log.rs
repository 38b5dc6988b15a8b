//! Access log stage: one structured line per request plus a request counter.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::LazyLock;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::Response,
};
use http_body::{Body as _, Frame, SizeHint};
use opentelemetry::{KeyValue, global, metrics::Counter};
use opentelemetry_semantic_conventions::trace::{HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE};

use crate::api::middleware::trace::TraceIds;
use crate::infrastructure::telemetry::INSTRUMENTATION_NAME;

static REQUESTS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    global::meter(INSTRUMENTATION_NAME)
        .u64_counter("http.server.requests")
        .with_unit("{request}")
        .with_description("Number of HTTP requests served")
        .build()
});

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// First `X-Forwarded-For` entry, else the peer address.
pub fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = header_str(req.headers(), "x-forwarded-for")
        && let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty())
    {
        return first.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Response body that counts the bytes it yields and hands the total to
/// `on_finish` exactly once, when the body is dropped after streaming or
/// abandoned by the client.
pub struct CountingBody<F: FnOnce(u64)> {
    inner: Body,
    sent: u64,
    on_finish: Option<F>,
}

impl<F: FnOnce(u64)> CountingBody<F> {
    pub fn new(inner: Body, on_finish: F) -> Self {
        Self {
            inner,
            sent: 0,
            on_finish: Some(on_finish),
        }
    }
}

impl<F: FnOnce(u64) + Unpin> http_body::Body for CountingBody<F> {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled
            && let Some(data) = frame.data_ref()
        {
            this.sent += data.len() as u64;
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<F: FnOnce(u64)> Drop for CountingBody<F> {
    fn drop(&mut self) {
        if let Some(on_finish) = self.on_finish.take() {
            on_finish(self.sent);
        }
    }
}

/// Request fields captured before the handler runs.
struct AccessRecord {
    start: Instant,
    method: Method,
    uri: String,
    path: String,
    query: String,
    client_ip: String,
    user_agent: String,
    payload_bytes: u64,
    request_id: String,
    trace_id: String,
    span_id: String,
    status: u16,
}

impl AccessRecord {
    fn emit(self, response_bytes: u64) {
        let latency = self.start.elapsed();
        let Self {
            method,
            uri,
            status,
            ..
        } = &self;

        tracing::info!(
            method = %method,
            path = %self.path,
            query = %self.query,
            status,
            latency = ?latency,
            client_ip = %self.client_ip,
            user_agent = %self.user_agent,
            payload_bytes = self.payload_bytes,
            response_bytes,
            request_id = %self.request_id,
            trace_id = %self.trace_id,
            span_id = %self.span_id,
            "[{latency:?}] [{status}] {method} {uri}"
        );

        REQUESTS.add(
            1,
            &[
                KeyValue::new(HTTP_REQUEST_METHOD, method.to_string()),
                KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(*status)),
            ],
        );
    }
}

/// Logs the request once its response body has been fully sent.
pub async fn layer(req: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = req.method().clone();
    let uri = req.uri().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let ip = client_ip(&req);
    let headers = req.headers();
    let user_agent = header_str(headers, header::USER_AGENT.as_str()).unwrap_or("-").to_string();
    let payload_bytes = header_str(headers, header::CONTENT_LENGTH.as_str())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let request_id = header_str(headers, "x-request-id").unwrap_or_default().to_string();
    let (trace_id, span_id) = req
        .extensions()
        .get::<TraceIds>()
        .cloned()
        .map(|t| (t.trace_id, t.span_id))
        .unwrap_or_default();

    let response = next.run(req).await;

    let record = AccessRecord {
        start,
        method,
        uri,
        path,
        query,
        client_ip: ip,
        user_agent,
        payload_bytes,
        request_id,
        trace_id,
        span_id,
        status: response.status().as_u16(),
    };

    let (parts, body) = response.into_parts();
    let body = CountingBody::new(body, move |sent| record.emit(sent));
    Response::from_parts(parts, Body::new(body))
}

//! CORS stage, installed only when `server.restAPI.cors` is configured.
//!
//! Preflight (`OPTIONS`) requests are answered here with `204 No Content`.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::CorsConfig;

/// Allowed origin for `origin`, if any.
///
/// Listed origins are echoed back. A `*` entry allows every origin; it is
/// echoed as the request origin when credentials are allowed.
fn allowed_origin(config: &CorsConfig, origin: Option<&str>) -> Option<String> {
    let wildcard = config.allow_origins.iter().any(|o| o == "*");
    match origin {
        Some(origin) if config.allow_origins.iter().any(|o| o == origin) => Some(origin.to_string()),
        Some(origin) if wildcard && config.allow_credentials => Some(origin.to_string()),
        _ if wildcard => Some("*".to_string()),
        _ => None,
    }
}

fn set_joined(headers: &mut HeaderMap, name: header::HeaderName, values: &[String]) {
    if values.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&values.join(", ")) {
        headers.insert(name, value);
    }
}

fn apply(config: &CorsConfig, origin: Option<&str>, headers: &mut HeaderMap) {
    if let Some(allowed) = allowed_origin(config, origin)
        && let Ok(value) = HeaderValue::from_str(&allowed)
    {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        if allowed != "*" {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
    }

    set_joined(headers, header::ACCESS_CONTROL_ALLOW_METHODS, &config.allow_methods);
    set_joined(headers, header::ACCESS_CONTROL_ALLOW_HEADERS, &config.allow_headers);
    set_joined(headers, header::ACCESS_CONTROL_EXPOSE_HEADERS, &config.expose_headers);

    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(config.max_age));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static(if config.allow_credentials { "true" } else { "false" }),
    );
}

pub async fn layer(State(config): State<Arc<CorsConfig>>, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply(&config, origin.as_deref(), response.headers_mut());
        return response;
    }

    let mut response = next.run(req).await;
    apply(&config, origin.as_deref(), response.headers_mut());
    response
}

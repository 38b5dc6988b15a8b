//! Panic recovery: a panicking handler yields a 500 envelope instead of a
//! dropped connection.

use std::any::Any;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::api::dto::envelope::Envelope;
use crate::error::INTERNAL_MESSAGE;

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    }
}

/// Renders a caught panic.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(panic = panic_message(panic.as_ref()), "request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Envelope::failure(INTERNAL_MESSAGE, Vec::new())),
    )
        .into_response()
}

pub fn layer() -> CatchPanicLayer<fn(Box<dyn Any + Send + 'static>) -> Response> {
    CatchPanicLayer::custom(panic_response as fn(Box<dyn Any + Send + 'static>) -> Response)
}

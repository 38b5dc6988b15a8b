//! Pipeline stages, listed outermost first.
//!
//! 1. [`recover`] - panics become a 500 envelope
//! 2. [`trace`] - server span and `X-Trace-ID`
//! 3. request id - `X-Request-Id` (tower-http)
//! 4. compression - gzip (tower-http)
//! 5. [`access_log`] - one log line and counter per request
//! 6. [`cors`] - only when configured
//! 7. [`security_headers`]
//! 8. [`pagination`] - opens the [`crate::api::context::RequestBag`]
//! 9. [`envelope::error_stage`] and [`envelope::success_stage`]
//! 10. [`auth`] - per route
//!
//! See [`crate::routes::pipeline`] for the assembly.

pub mod access_log;
pub mod auth;
pub mod cors;
pub mod envelope;
pub mod pagination;
pub mod recover;
pub mod security_headers;
pub mod trace;

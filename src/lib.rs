//! # service-helper
//!
//! Scaffolding for small Axum services. One call to [`app::start`] loads
//! configuration, installs logging and OpenTelemetry, connects the configured
//! SQL, Redis and object storage backends and serves the routes registered on
//! [`server::Server`] behind a fixed middleware pipeline.
//!
//! ## Architecture
//!
//! - **Domain Layer** ([`domain`]) - principal and the key-value store trait
//! - **Application Layer** ([`application`]) - token issuance and verification
//! - **Infrastructure Layer** ([`infrastructure`]) - logging, telemetry, SQL, Redis, S3
//! - **API Layer** ([`api`]) - request bag, envelope, extractors, middleware, health
//!
//! ## Response envelope
//!
//! Handlers put their output in the [`api::context::RequestBag`] and return
//! an empty `200`; the success stage renders
//! `{"message":"Success","data":...,"page":...}`. Errors are rendered as
//! `{"message":...,"errors":[...]}` with the matching status.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use axum::routing::get;
//! use service_helper::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     service_helper::app::start(|server| {
//!         server.protected_route("/hello", get(hello), "");
//!     })
//!     .await;
//! }
//!
//! async fn hello(bag: RequestBag) {
//!     bag.set_data("Hello, World!");
//! }
//! ```
//!
//! ## Configuration
//!
//! Read from `config.{yaml,json,toml}` (or the file named by `HELPER_CONFIG`),
//! with `HELPER__SECTION__KEY` environment overrides and `${VAR}` placeholders.
//! See [`config`].

pub mod api;
pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod routes;
pub mod server;
pub mod state;
pub mod utils;

pub use error::AppError;
pub use state::AppState;

/// Commonly used types for services built on this crate.
pub mod prelude {
    pub use crate::api::context::RequestBag;
    pub use crate::api::dto::pagination::{PageRequest, PageResponse};
    pub use crate::api::extract::ValidatedJson;
    pub use crate::application::services::{TokenKind, TokenPair, TokenService};
    pub use crate::domain::principal::PrincipalContext;
    pub use crate::error::AppError;
    pub use crate::server::Server;
    pub use crate::state::AppState;
}

//! Infrastructure layer for external integrations.
//!
//! Each client is optional and built from its config section at startup.
//!
//! # Modules
//!
//! - [`database`] - PostgreSQL pool and its health checker
//! - [`kv`] - Key-value stores (Redis and in-memory) for token bindings
//! - [`logger`] - JSON log sinks
//! - [`storage`] - S3-compatible object storage
//! - [`telemetry`] - OpenTelemetry export and propagation

pub mod database;
pub mod kv;
pub mod logger;
pub mod storage;
pub mod telemetry;

//! REST API layer.
//!
//! # Modules
//!
//! - [`context`] - per-request bag shared by stages and handlers
//! - [`dto`] - envelope, pagination and health payloads
//! - [`extract`] - validated JSON binding
//! - [`handlers`] - built-in handlers
//! - [`middleware`] - pipeline stages

pub mod context;
pub mod dto;
pub mod extract;
pub mod handlers;
pub mod middleware;

//! Built-in handlers.

pub mod health;

pub use health::{FnChecker, HealthChecker, HealthRegistry, health_handler};

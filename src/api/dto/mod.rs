//! Wire payloads.

pub mod envelope;
pub mod health;
pub mod pagination;

//! Application layer services.
//!
//! # Available Services
//!
//! - [`services::token_service::TokenService`] - RS256 token pairs bound to the key-value store

pub mod services;

//! Services used by the HTTP pipeline and by application handlers.

pub mod token_service;

pub use token_service::{Claims, TokenKind, TokenPair, TokenService};

//! Storage contracts for the domain layer.
//!
//! Implementations live in `crate::infrastructure`; mocks are generated via
//! `mockall` for unit tests.

pub mod key_value_store;

pub use key_value_store::{KeyValueStore, KvError, KvResult};

#[cfg(test)]
pub use key_value_store::MockKeyValueStore;

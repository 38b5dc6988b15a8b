//! Domain types shared by the service layer and the HTTP pipeline.
//!
//! - [`principal`] - Authenticated caller attached by the auth stage
//! - [`repositories`] - Storage contracts implemented by the infrastructure layer

pub mod principal;
pub mod repositories;

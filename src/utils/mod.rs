//! Validation helpers used by request binding.
//!
//! - [`validators`] - `isUrl`, `isActiveEmail`, `enum` and error message mapping

pub mod validators;

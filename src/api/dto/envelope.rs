//! The JSON envelope every pipeline reply is wrapped in.
//!
//! ```json
//! {"message": "Success", "data": ..., "page": {"totalPage": 1, "totalRecord": 2}}
//! {"message": "Validation failed", "errors": [{"field": "fullName", "message": "fullName is required"}]}
//! ```
//!
//! A success envelope never carries `errors` and a failure envelope never carries
//! `data` or `page`; the two constructors are the only way to build one.

use serde::Serialize;
use serde_json::Value;

use super::pagination::PageResponse;

/// Message used by the success stage.
pub const SUCCESS_MESSAGE: &str = "Success";

/// One failed field in a validation reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Canonical reply body.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<PageResponse>,
}

impl Envelope {
    pub fn success(data: Option<Value>, page: Option<PageResponse>) -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_string(),
            errors: None,
            data,
            page,
        }
    }

    /// Failure envelope; `errors` is omitted when empty.
    pub fn failure(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self {
            message: message.into(),
            errors: (!errors.is_empty()).then_some(errors),
            data: None,
            page: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

//! DTOs for the health endpoint.

use std::collections::BTreeMap;

use serde::Serialize;

pub const STATUS_OK: &str = "OK";
pub const STATUS_UNAVAILABLE: &str = "Service Unavailable";

/// Health reply with one entry per registered checker.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub checks: BTreeMap<String, CheckStatus>,
}

/// Outcome of a single checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckStatus {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK.to_string(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: STATUS_UNAVAILABLE.to_string(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

//! Request body binding with validation.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use validator::Validate;

use crate::error::AppError;
use crate::utils::validators::field_errors;

/// JSON body that has been deserialized and validated.
///
/// - empty or truncated body: 400 `Bad Request`
/// - any other decode failure: 500
/// - validation failures: 422 with one entry per failed field
///
/// Validation runs on the blocking pool because custom validators may perform
/// DNS lookups.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            AppError::bad_request("Failed to read request body", json!({ "reason": e.body_text() }))
        })?;

        let value = decode::<T>(&bytes)?;

        let value = tokio::task::spawn_blocking(move || match value.validate() {
            Ok(()) => Ok(value),
            Err(errors) => Err(AppError::validation(field_errors(&errors))),
        })
        .await
        .map_err(|e| AppError::internal("Validation task failed", json!({ "reason": e.to_string() })))??;

        Ok(ValidatedJson(value))
    }
}

/// Decodes a JSON body, reporting end-of-input as a bad request.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::bad_request("EOF", json!({})));
    }

    serde_json::from_slice(bytes).map_err(|e| {
        if e.is_eof() {
            AppError::bad_request("EOF", json!({ "reason": e.to_string() }))
        } else {
            AppError::internal("Failed to decode request body", json!({ "reason": e.to_string() }))
        }
    })
}

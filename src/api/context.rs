//! Per-request bag shared between pipeline stages and the handler.
//!
//! The pagination stage creates one [`RequestBag`] per request and stores it in
//! the request extensions. The auth stage adds the principal, the handler sets
//! `data`/`pagination` or records errors, and the envelope stages read it back
//! once the handler has returned.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};

use crate::api::dto::pagination::{PageRequest, PageResponse};
use crate::domain::principal::PrincipalContext;
use crate::error::AppError;

#[derive(Debug, Default)]
struct BagState {
    page: PageRequest,
    data: Option<Value>,
    pagination: Option<PageResponse>,
    principal: Option<PrincipalContext>,
    errors: Vec<AppError>,
}

/// Typed carrier for request-scoped values.
///
/// Cloning is cheap; all clones refer to the same bag.
#[derive(Debug, Clone, Default)]
pub struct RequestBag {
    inner: Arc<Mutex<BagState>>,
}

impl RequestBag {
    pub fn new(page: PageRequest) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BagState {
                page,
                ..Default::default()
            })),
        }
    }

    /// Effective pagination input for this request.
    pub fn page(&self) -> PageRequest {
        self.inner.lock().page.clone()
    }

    /// Sets the `data` member of the success envelope.
    ///
    /// A value that fails to serialize is recorded as an internal error instead.
    pub fn set_data<T: Serialize>(&self, data: T) {
        match serde_json::to_value(data) {
            Ok(value) => self.inner.lock().data = Some(value),
            Err(e) => self.record_error(AppError::internal(
                "Failed to serialize response data",
                json!({ "reason": e.to_string() }),
            )),
        }
    }

    /// Sets the `page` member of the success envelope.
    pub fn set_pagination(&self, page: PageResponse) {
        self.inner.lock().pagination = Some(page);
    }

    /// Records an error; the error stage replies with the last one recorded.
    pub fn record_error(&self, error: impl Into<AppError>) {
        self.inner.lock().errors.push(error.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.inner.lock().errors.is_empty()
    }

    pub fn principal(&self) -> Option<PrincipalContext> {
        self.inner.lock().principal.clone()
    }

    pub(crate) fn set_principal(&self, principal: PrincipalContext) {
        self.inner.lock().principal = Some(principal);
    }

    /// Removes and returns the most recent error, dropping the others.
    pub(crate) fn take_last_error(&self) -> Option<AppError> {
        let mut state = self.inner.lock();
        let last = state.errors.pop();
        state.errors.clear();
        last
    }

    /// Takes the handler outputs for the success envelope.
    pub(crate) fn take_output(&self) -> (Option<Value>, Option<PageResponse>) {
        let mut state = self.inner.lock();
        (state.data.take(), state.pagination.take())
    }
}

impl<S> FromRequestParts<S> for RequestBag
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestBag>().cloned().ok_or_else(|| {
            AppError::internal(
                "Request bag missing; is the pagination stage installed?",
                json!({}),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let bag = RequestBag::new(PageRequest::default());
        let handle = bag.clone();
        handle.set_data(vec!["a", "b"]);
        handle.set_pagination(PageResponse::new(2, 10));

        let (data, page) = bag.take_output();
        assert_eq!(data, Some(json!(["a", "b"])));
        assert_eq!(page, Some(PageResponse::new(2, 10)));
    }

    #[test]
    fn test_last_error_wins() {
        let bag = RequestBag::default();
        bag.record_error(AppError::not_found("first", json!({})));
        bag.record_error(AppError::bad_request("second", json!({})));
        assert!(bag.has_errors());

        let err = bag.take_last_error().unwrap();
        assert!(matches!(err, AppError::BadRequest { .. }));
        assert!(!bag.has_errors());
    }

    #[test]
    fn test_principal_round_trip() {
        let bag = RequestBag::default();
        assert!(bag.principal().is_none());
        bag.set_principal(PrincipalContext {
            issuer: "svc".into(),
            subject: "u1".into(),
            abilities: vec!["read".into()],
        });
        assert_eq!(bag.principal().unwrap().subject, "u1");
    }

    #[test]
    fn test_sqlx_errors_can_be_recorded_directly() {
        let bag = RequestBag::default();
        bag.record_error(sqlx::Error::RowNotFound);
        assert!(matches!(
            bag.take_last_error(),
            Some(AppError::NotFound { .. })
        ));
    }
}

//! Access token authentication, applied per route.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use serde_json::json;

use crate::api::context::RequestBag;
use crate::application::services::token_service::{Claims, TokenKind, TokenService};
use crate::domain::principal::PrincipalContext;
use crate::error::AppError;

/// Cookie checked before the `Authorization` header.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// State of one protected route: the token service and the ability it requires.
///
/// An empty permission only requires a valid token.
#[derive(Clone)]
pub struct AuthGuard {
    tokens: Option<Arc<TokenService>>,
    permission: Arc<str>,
}

impl AuthGuard {
    pub fn new(tokens: Option<Arc<TokenService>>, permission: impl Into<Arc<str>>) -> Self {
        Self {
            tokens,
            permission: permission.into(),
        }
    }

    pub fn permission(&self) -> &str {
        &self.permission
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Access token from the `access_token` cookie, else from `Authorization: Bearer`.
pub fn access_token(headers: &HeaderMap) -> Option<&str> {
    cookie_value(headers, ACCESS_TOKEN_COOKIE).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    })
}

fn principal_from(claims: Claims) -> PrincipalContext {
    PrincipalContext {
        issuer: claims.iss,
        subject: claims.sub,
        abilities: claims.aud,
    }
}

/// Authenticates the request.
///
/// # Errors
///
/// - `401 Unauthorized` when no token is present or it fails verification
/// - `403 Access Denied` when the token lacks the required ability
/// - `500` when no token service is configured
pub async fn layer(
    State(guard): State<AuthGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(tokens) = guard.tokens.as_ref() else {
        return Err(AppError::internal(
            "Protected route without a token service",
            json!({ "path": req.uri().path() }),
        ));
    };

    let token = access_token(req.headers()).ok_or_else(|| {
        AppError::unauthorized(
            "Unauthorized",
            json!({ "reason": "access token cookie or bearer header is missing" }),
        )
    })?;

    let claims = tokens.verify(token, TokenKind::Access, true).await?;
    let principal = principal_from(claims);

    if !principal.can(guard.permission()) {
        return Err(AppError::forbidden(
            "Access Denied",
            json!({ "subject": principal.subject, "permission": guard.permission() }),
        ));
    }

    if let Some(bag) = req.extensions().get::<RequestBag>() {
        bag.set_principal(principal.clone());
    }
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for PrincipalContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<PrincipalContext>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Unauthorized", json!({ "reason": "route is not protected" })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_cookie_takes_precedence() {
        let map = headers(&[
            (header::COOKIE, "theme=dark; access_token=from-cookie"),
            (header::AUTHORIZATION, "Bearer from-header"),
        ]);
        assert_eq!(access_token(&map), Some("from-cookie"));
    }

    #[test]
    fn test_bearer_header() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer abc.def.ghi")]);
        assert_eq!(access_token(&map), Some("abc.def.ghi"));
    }

    #[test]
    fn test_other_schemes_are_ignored() {
        let map = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert_eq!(access_token(&map), None);
        assert_eq!(access_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cookie_across_multiple_headers() {
        let map = headers(&[
            (header::COOKIE, "a=1"),
            (header::COOKIE, "access_token=tok"),
        ]);
        assert_eq!(access_token(&map), Some("tok"));
    }
}

//! Pagination stage: parses `page`, `pageSize` and `search` from the query
//! string and opens the request bag.

use axum::{
    extract::{Query, Request},
    middleware::Next,
    response::Response,
};

use crate::api::context::RequestBag;
use crate::api::dto::pagination::{PageQuery, PageRequest};

/// Reads the page parameters; malformed query strings fall back to defaults.
pub fn parse_page(req: &Request) -> PageRequest {
    let query = Query::<PageQuery>::try_from_uri(req.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();
    PageRequest::from_query(query)
}

pub async fn layer(mut req: Request, next: Next) -> Response {
    let bag = RequestBag::new(parse_page(&req));
    req.extensions_mut().insert(bag);
    next.run(req).await
}

//! Pagination query parameters and the pagination echo returned to clients.

use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnError, DisplayFromStr, serde_as};

/// Page used when the query omits `page` or sends a value below one.
pub const DEFAULT_PAGE: i64 = 1;
/// Page size used when the query omits `pageSize` or sends a value below one.
pub const DEFAULT_PAGE_SIZE: i64 = 10;
/// Upper bound for `pageSize`.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw pagination query as sent by the client.
///
/// Uses `serde_with` to parse numbers out of query strings. A value that is not
/// an integer is treated the same as an absent one.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde_as(as = "DefaultOnError<Option<DisplayFromStr>>")]
    #[serde(default)]
    pub page: Option<i64>,

    #[serde_as(as = "DefaultOnError<Option<DisplayFromStr>>")]
    #[serde(default, rename = "pageSize")]
    pub page_size: Option<i64>,

    #[serde(default, alias = "Search")]
    pub search: Option<String>,
}

/// Effective pagination input for a request, always within bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }
}

impl PageRequest {
    /// Clamps raw query values into bounds.
    ///
    /// - `page < 1` becomes `1`
    /// - `pageSize < 1` becomes `10`
    /// - `pageSize > 100` becomes `100`
    pub fn from_query(query: PageQuery) -> Self {
        let page = match query.page {
            Some(p) if p >= 1 => p,
            _ => DEFAULT_PAGE,
        };

        let page_size = match query.page_size {
            Some(s) if s > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
            Some(s) if s >= 1 => s,
            _ => DEFAULT_PAGE_SIZE,
        };

        let search = query.search.filter(|s| !s.is_empty());

        Self {
            page,
            page_size,
            search,
        }
    }

    /// Converts the page into an `(offset, limit)` pair for SQL queries.
    pub fn offset_limit(&self) -> (i64, i64) {
        ((self.page - 1) * self.page_size, self.page_size)
    }
}

/// Pagination echo set by handlers and rendered under `page` in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub total_page: i64,
    pub total_record: i64,
}

impl PageResponse {
    /// Builds the echo from a total record count and the requested page size.
    pub fn new(total_record: i64, page_size: i64) -> Self {
        let total_page = if page_size > 0 {
            (total_record + page_size - 1) / page_size
        } else {
            0
        };
        Self {
            total_page,
            total_record,
        }
    }
}

//! Query shapes: queries, opaque cursors, and result pages.
//!
//! Query-language semantics (filters, projections) are opaque to this
//! client core; only the pagination contract matters here.

use serde::Deserialize;
use serde::Serialize;

use crate::entity::Entity;

/// A query definition, treated as an opaque unit beyond its kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    pub kind: String,
    /// Server-interpreted filter expression, if any.
    pub filter: Option<String>,
    /// Maximum results per page; the server may return fewer.
    pub page_size: Option<u32>,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            filter: None,
            page_size: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Opaque continuation token letting a query resume where a prior page
/// left off, including across process boundaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Cursor(Vec<u8>);

impl Cursor {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryPage {
    /// Results for this page, in server order.
    pub entities: Vec<Entity>,
    /// Cursor for the next page; `None` means the query is exhausted.
    pub end_cursor: Option<Cursor>,
}

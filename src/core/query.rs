//! Listing options and query-string parameters

use serde::Deserialize;

/// Options for store listing queries
///
/// Results are always ordered by creation time; `newest_first` picks the
/// direction. `limit = None` returns everything that matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: Option<usize>,
    pub newest_first: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: None,
            newest_first: true,
        }
    }
}

impl QueryOptions {
    pub fn newest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            newest_first: true,
        }
    }
}

/// Query parameters accepted by order listing routes
///
/// # Example
/// ```text
/// GET /orders/user/{buyerId}?recent=true
/// GET /orders/user/{buyerId}?limit=5
/// GET /orders/seller/{sellerId}?limit=20
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    /// Only the most recent orders (default recent limit applies)
    pub recent: bool,

    /// Explicit number of orders to return
    pub limit: Option<usize>,
}

impl ListParams {
    /// Resolve to store options
    ///
    /// An explicit `limit` wins, `recent` falls back to `recent_limit`, and
    /// everything is capped at `max_limit`.
    pub fn to_options(&self, recent_limit: usize, max_limit: usize) -> QueryOptions {
        let wanted = match (self.limit, self.recent) {
            (Some(limit), _) => limit,
            (None, true) => recent_limit,
            (None, false) => max_limit,
        };
        QueryOptions::newest(wanted.clamp(1, max_limit.max(1)))
    }
}

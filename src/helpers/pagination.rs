//! Page-number and limit/offset pagination over list endpoints.
//!
//! If the query carries `limit` or `offset` the limit/offset strategy is used,
//! otherwise page numbers. Both produce the same `{count, next, previous,
//! results}` envelope with relative links.

use crate::error::ApiError;
use crate::schemas::Paginated;

/// Largest `limit` a client may ask for.
pub const MAX_PAGE_SIZE: u64 = 1000;

/// SQL binds offsets as signed 64-bit integers.
const MAX_OFFSET: u64 = i64::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    PageNumber { page: u64, page_size: u64 },
    LimitOffset { limit: u64, offset: u64 },
}

impl PageRequest {
    /// Picks the strategy from raw query pairs.
    ///
    /// An unparsable `limit`/`offset` falls back to its default; an invalid
    /// `page` is an error. Oversized values are clamped.
    pub fn from_pairs(pairs: &[(String, String)], page_size: u64) -> Result<Self, ApiError> {
        let value = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        if value("limit").is_some() || value("offset").is_some() {
            let limit = value("limit")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|limit| *limit > 0)
                .map_or(page_size, |limit| limit.min(MAX_PAGE_SIZE));
            let offset = value("offset")
                .and_then(|v| v.parse::<u64>().ok())
                .map_or(0, |offset| offset.min(MAX_OFFSET));
            return Ok(PageRequest::LimitOffset { limit, offset });
        }

        let page = match value("page") {
            None => 1,
            Some(raw) => match raw.parse::<u64>() {
                Ok(page) if page >= 1 => page,
                _ => return Err(invalid_page()),
            },
        };
        Ok(PageRequest::PageNumber { page, page_size })
    }

    pub fn limit(&self) -> u64 {
        match self {
            PageRequest::PageNumber { page_size, .. } => *page_size,
            PageRequest::LimitOffset { limit, .. } => *limit,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            PageRequest::PageNumber { page, page_size } => {
                (page - 1).saturating_mul(*page_size).min(MAX_OFFSET)
            }
            PageRequest::LimitOffset { offset, .. } => *offset,
        }
    }

    /// Rejects page numbers past the last page. Page 1 of an empty list is valid.
    pub fn check_range(&self, count: u64) -> Result<(), ApiError> {
        if let PageRequest::PageNumber { page, page_size } = self {
            let pages = count.div_ceil(*page_size).max(1);
            if *page > pages {
                return Err(invalid_page());
            }
        }
        Ok(())
    }

    fn links(&self, count: u64) -> (Option<Vec<(&'static str, u64)>>, Option<Vec<(&'static str, u64)>>) {
        match *self {
            PageRequest::PageNumber { page, page_size } => {
                let next = (page.saturating_mul(page_size) < count).then(|| vec![("page", page + 1)]);
                let previous = match page {
                    1 => None,
                    // DRF drops the page parameter for the first page
                    2 => Some(vec![]),
                    _ => Some(vec![("page", page - 1)]),
                };
                (next, previous)
            }
            PageRequest::LimitOffset { limit, offset } => {
                let end = offset.saturating_add(limit);
                let next = (end < count).then(|| vec![("limit", limit), ("offset", end)]);
                let previous = (offset > 0).then(|| {
                    let previous_offset = offset.saturating_sub(limit);
                    if previous_offset == 0 {
                        vec![("limit", limit)]
                    } else {
                        vec![("limit", limit), ("offset", previous_offset)]
                    }
                });
                (next, previous)
            }
        }
    }
}

fn invalid_page() -> ApiError {
    ApiError::NotFound("Invalid page.".to_string())
}

/// Relative URL of `path` with the pagination keys replaced and every other
/// query parameter kept in its original order.
fn build_link(path: &str, pairs: &[(String, String)], overrides: &[(&'static str, u64)]) -> String {
    const KEYS: [&str; 3] = ["page", "limit", "offset"];

    let mut query: Vec<(String, String)> = pairs
        .iter()
        .filter(|(k, _)| !KEYS.contains(&k.as_str()))
        .cloned()
        .collect();
    query.extend(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    match serde_urlencoded::to_string(&query) {
        Ok(encoded) if !encoded.is_empty() => format!("{path}?{encoded}"),
        _ => path.to_string(),
    }
}

/// Wraps one page of results in the paginated envelope.
pub fn paginate<T>(
    results: Vec<T>,
    count: u64,
    request: &PageRequest,
    path: &str,
    pairs: &[(String, String)],
) -> Paginated<T> {
    let (next, previous) = request.links(count);
    Paginated {
        count,
        next: next.map(|overrides| build_link(path, pairs, &overrides)),
        previous: previous.map(|overrides| build_link(path, pairs, &overrides)),
        results,
    }
}

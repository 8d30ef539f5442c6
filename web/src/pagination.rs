//! Pagination for list endpoints.
//!
//! Pages are 1-based. A page envelope looks like:
//!
//! ```json
//! {
//!   "current_page": 2,
//!   "data": [ ... ],
//!   "per_page": 10,
//!   "total": 23,
//!   "last_page": 3,
//!   "from": 11,
//!   "to": 20
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};

/// `?page=` query parameter.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    /// Requested page (1-based). Missing, zero, negative, or non-numeric
    /// values mean the first page.
    #[serde(default, deserialize_with = "lenient_page")]
    pub page: Option<u32>,
}

fn lenient_page<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.trim().parse::<u32>().ok()))
}

impl PageQuery {
    /// Turn the query into a request with a fixed page size.
    #[must_use]
    pub fn with_per_page(self, per_page: u32) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), per_page)
    }
}

/// A resolved page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number, at least 1
    pub page: u32,
    /// Page size, at least 1
    pub per_page: u32,
}

impl PageRequest {
    /// Create a page request, clamping page and size to at least 1.
    #[must_use]
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Rows to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    /// Rows to take.
    #[must_use]
    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page<T> {
    /// Page number
    pub current_page: u32,
    /// Rows on this page
    pub data: Vec<T>,
    /// Page size
    pub per_page: u32,
    /// Rows across all pages
    pub total: u64,
    /// Last page number (1 when empty)
    pub last_page: u32,
    /// 1-based index of the first row on this page
    pub from: Option<u64>,
    /// 1-based index of the last row on this page
    pub to: Option<u64>,
}

impl<T> Page<T> {
    /// Wrap rows fetched for `request` out of `total`.
    #[must_use]
    pub fn new(data: Vec<T>, request: PageRequest, total: u64) -> Self {
        let last_page = u32::try_from(total.div_ceil(request.limit()))
            .unwrap_or(u32::MAX)
            .max(1);
        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let from = request.offset() + 1;
            (Some(from), Some(from + data.len() as u64 - 1))
        };

        Self {
            current_page: request.page,
            data,
            per_page: request.per_page,
            total,
            last_page,
            from,
            to,
        }
    }

    /// Paginate an already-ordered, complete list.
    #[must_use]
    pub fn from_vec(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len() as u64;
        let skip = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(request.limit()).unwrap_or(usize::MAX);
        let data = items.into_iter().skip(skip).take(take).collect();
        Self::new(data, request, total)
    }

    /// Transform every row, keeping the envelope.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            current_page: self.current_page,
            data: self.data.into_iter().map(f).collect(),
            per_page: self.per_page,
            total: self.total,
            last_page: self.last_page,
            from: self.from,
            to: self.to,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::Uri};

    fn page_of(uri: &str) -> PageRequest {
        let uri: Uri = uri.parse().expect("valid uri");
        let Query(query) = Query::<PageQuery>::try_from_uri(&uri).expect("query always parses");
        query.with_per_page(10)
    }

    #[test]
    fn test_page_from_query_string() {
        assert_eq!(page_of("/api/trips?page=3").page, 3);
        assert_eq!(page_of("/api/trips").page, 1);
    }

    #[test]
    fn test_unusable_page_falls_back_to_first() {
        for uri in ["/api/trips?page=abc", "/api/trips?page=-1", "/api/trips?page=", "/api/trips?page=1.5"] {
            assert_eq!(page_of(uri).page, 1, "{uri}");
        }
    }

    #[test]
    fn test_page_zero_is_first_page() {
        let request = PageQuery { page: Some(0) }.with_per_page(10);
        assert_eq!(request.page, 1);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn test_from_vec_slices_and_counts() {
        let items: Vec<u32> = (1..=23).collect();
        let page = Page::from_vec(items, PageRequest::new(3, 10));

        assert_eq!(page.data, vec![21, 22, 23]);
        assert_eq!(page.total, 23);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.from, Some(21));
        assert_eq!(page.to, Some(23));
    }

    #[test]
    fn test_empty_page() {
        let page: Page<u32> = Page::from_vec(Vec::new(), PageRequest::new(1, 20));
        assert_eq!(page.last_page, 1);
        assert_eq!(page.from, None);
        assert_eq!(page.to, None);
    }

    #[test]
    fn test_past_the_end() {
        let page = Page::from_vec(vec![1, 2], PageRequest::new(4, 10));
        assert!(page.data.is_empty());
        assert_eq!(page.total, 2);
        assert_eq!(page.current_page, 4);
    }

    #[test]
    fn test_map_keeps_envelope() {
        let page = Page::from_vec(vec![1, 2, 3], PageRequest::new(1, 2)).map(|n| n * 10);
        assert_eq!(page.data, vec![10, 20]);
        assert_eq!(page.total, 3);
        assert_eq!(page.last_page, 2);
    }
}

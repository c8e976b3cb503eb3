//! Offset pagination utilities.

use serde::{Deserialize, Serialize};

/// Default page size when the caller does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Normalized page request: `page` is 1-based, `limit` is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Build a page request from optional caller input.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Row offset for SQL `OFFSET`.
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

/// Pagination block returned alongside a page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        let total = total.max(0);
        let limit = request.limit as i64;
        Self {
            page: request.page,
            limit: request.limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults() {
        let req = PageRequest::new(None, None);
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn test_page_request_clamps() {
        let req = PageRequest::new(Some(0), Some(1000));
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, MAX_PAGE_SIZE);

        let req = PageRequest::new(Some(3), Some(0));
        assert_eq!(req.limit, 1);
        assert_eq!(req.offset(), 2);
    }

    #[test]
    fn test_offset() {
        let req = PageRequest::new(Some(4), Some(25));
        assert_eq!(req.offset(), 75);
    }

    #[test]
    fn test_total_pages() {
        let req = PageRequest::new(Some(1), Some(10));
        assert_eq!(Pagination::new(req, 0).total_pages, 0);
        assert_eq!(Pagination::new(req, 1).total_pages, 1);
        assert_eq!(Pagination::new(req, 10).total_pages, 1);
        assert_eq!(Pagination::new(req, 11).total_pages, 2);
    }

    #[test]
    fn test_pagination_serializes_camel_case() {
        let pagination = Pagination::new(PageRequest::new(Some(2), Some(5)), 12);
        let json = serde_json::to_value(&pagination).unwrap();
        assert_eq!(json["page"], 2);
        assert_eq!(json["limit"], 5);
        assert_eq!(json["total"], 12);
        assert_eq!(json["totalPages"], 3);
    }
}

//! Query Builder pagination operations

use serde::Serialize;

use super::builder::Query;

impl Query {
    /// Add LIMIT clause
    pub fn limit(mut self, count: i64) -> Self {
        self.limit_count = Some(count);
        self
    }

    /// Add OFFSET clause
    pub fn offset_by(mut self, count: i64) -> Self {
        self.offset_value = Some(count);
        self
    }

    /// Add pagination (LIMIT + OFFSET). Pages are 1-based.
    pub fn paginate(mut self, per_page: i64, page: i64) -> Self {
        let page = page.max(1);
        self.limit_count = Some(per_page);
        self.offset_value = Some((page - 1) * per_page);
        self
    }
}

/// One page of results plus the totals needed to render pagination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: i64,
    pub per_page: i64,
    pub last_page: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: i64, per_page: i64) -> Self {
        let last_page = if per_page > 0 {
            ((total as i64) + per_page - 1) / per_page
        } else {
            0
        }
        .max(1);
        Self {
            items,
            total,
            page: page.max(1),
            per_page,
            last_page,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        self.page < self.last_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_offsets() {
        let query = Query::table("comments").paginate(10, 3);
        assert_eq!(query.limit_value(), Some(10));
        assert_eq!(query.offset(), Some(20));

        let clamped = Query::table("comments").paginate(10, 0);
        assert_eq!(clamped.offset(), Some(0));
    }

    #[test]
    fn test_page_totals() {
        let page = Page::new(vec![1, 2], 12, 2, 5);
        assert_eq!(page.last_page, 3);
        assert!(page.has_more_pages());

        let empty: Page<i32> = Page::new(vec![], 0, 1, 5);
        assert_eq!(empty.last_page, 1);
        assert!(!empty.has_more_pages());
    }
}

//! Pagination helper types for repository queries

use serde::{Deserialize, Serialize};

/// A window into a repository's id-ordered contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of items to skip
    pub offset: usize,
    /// Maximum number of items to return
    pub limit: usize,
}

impl PageRequest {
    /// Create a new page request
    ///
    /// # Examples
    ///
    /// ```
    /// use core_library::repositories::PageRequest;
    ///
    /// let request = PageRequest::new(40, 20);
    /// assert_eq!(request.offset, 40);
    /// assert_eq!(request.limit, 20);
    /// ```
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Request the `page`-th page (0-indexed) of `page_size` items.
    pub fn page(page: usize, page_size: usize) -> Self {
        Self {
            offset: page.saturating_mul(page_size),
            limit: page_size,
        }
    }

    /// The request for the window directly after this one.
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            limit: self.limit,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// Paginated response containing items and metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in the current window
    pub items: Vec<T>,
    /// Total number of items in the repository
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    /// Create a new paginated response
    ///
    /// # Examples
    ///
    /// ```
    /// use core_library::repositories::{Page, PageRequest};
    ///
    /// let page = Page::new(vec![1, 2, 3], 25, PageRequest::new(0, 3));
    ///
    /// assert_eq!(page.items.len(), 3);
    /// assert_eq!(page.total, 25);
    /// assert!(page.has_next());
    /// assert!(!page.has_previous());
    /// ```
    pub fn new(items: Vec<T>, total: usize, request: PageRequest) -> Self {
        Self {
            items,
            total,
            offset: request.offset,
            limit: request.limit,
        }
    }

    /// Check if there are items after this window
    pub fn has_next(&self) -> bool {
        self.offset.saturating_add(self.items.len()) < self.total
    }

    /// Check if there are items before this window
    pub fn has_previous(&self) -> bool {
        self.offset > 0
    }

    /// Map the items to a different type
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_default() {
        let request = PageRequest::default();
        assert_eq!(request.offset, 0);
        assert_eq!(request.limit, 50);
    }

    #[test]
    fn test_page_request_from_page_number() {
        assert_eq!(PageRequest::page(0, 20), PageRequest::new(0, 20));
        assert_eq!(PageRequest::page(2, 20), PageRequest::new(40, 20));
        assert_eq!(PageRequest::page(2, 20).next(), PageRequest::new(60, 20));
    }

    #[test]
    fn test_page_has_next() {
        let page = Page::new(vec![1, 2], 4, PageRequest::new(2, 2));
        assert!(!page.has_next());
        assert!(page.has_previous());

        let page = Page::new(vec![1, 2], 5, PageRequest::new(2, 2));
        assert!(page.has_next());
    }

    #[test]
    fn test_page_past_the_end() {
        let page: Page<u8> = Page::new(Vec::new(), 3, PageRequest::new(10, 5));
        assert!(!page.has_next());
        assert!(page.has_previous());
    }

    #[test]
    fn test_page_map() {
        let page = Page::new(vec![1, 2, 3], 3, PageRequest::new(0, 10));
        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.items, vec![10, 20, 30]);
        assert_eq!(mapped.total, 3);
    }
}

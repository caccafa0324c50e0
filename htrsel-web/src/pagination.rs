//! Pagination for the admin lists
//!
//! Pages are 1-indexed and carried in the `p` query parameter.

use crate::html::{escape, Query};

/// Document list page size
pub const DOCUMENT_PAGE_SIZE: i64 = 50;

/// Line segment list page size
pub const SEGMENT_PAGE_SIZE: i64 = 100;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
    pub page_size: i64,
}

/// Calculate pagination metadata from total results and requested page
///
/// Ensures page is within valid bounds [1, total_pages]
///
/// # Examples
/// ```
/// use htrsel_web::pagination::calculate_pagination;
///
/// // 120 total results at 50 per page = 3 pages
/// let p = calculate_pagination(120, 2, 50);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 50);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(120, 99, 50);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 100);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64, page_size: i64) -> Pagination {
    let page_size = page_size.max(1);
    let total_results = total_results.max(0);
    let total_pages = total_results / page_size + i64::from(total_results % page_size != 0);
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        total_pages,
        offset,
        page_size,
    }
}

/// Parse the `p` parameter; anything unparsable is page 1
pub fn parse_page(raw: Option<&str>) -> i64 {
    raw.and_then(|p| p.trim().parse().ok()).unwrap_or(1)
}

impl Pagination {
    /// Page links for `base_path`, keeping the other query parameters
    pub fn links(&self, base_path: &str, query: &Query, total_results: i64) -> String {
        let mut out = String::from(r#"<p class="paginator">"#);
        if self.total_pages > 1 {
            for page in 1..=self.total_pages {
                if page == self.page {
                    out.push_str(&format!("<strong>{}</strong>", page));
                } else {
                    let target = format!("{}{}", base_path, query.with("p", &page.to_string()).suffix());
                    out.push_str(&format!(r#"<a href="{}">{}</a>"#, escape(&target), page));
                }
            }
        }
        out.push_str(&format!(" {} total</p>", total_results));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(250, 2, SEGMENT_PAGE_SIZE);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_document_page_size() {
        let p = calculate_pagination(51, 2, DOCUMENT_PAGE_SIZE);
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.offset, 50);
    }

    #[test]
    fn test_pagination_out_of_bounds_high() {
        let p = calculate_pagination(150, 99, SEGMENT_PAGE_SIZE);
        assert_eq!(p.page, 2);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_out_of_bounds_low() {
        let p = calculate_pagination(150, 0, SEGMENT_PAGE_SIZE);
        assert_eq!(p.page, 1);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, 1, DOCUMENT_PAGE_SIZE);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_links_keep_filters() {
        let q = Query::of(&[("transcribed", "no"), ("p", "1")]);
        let links = calculate_pagination(250, 1, SEGMENT_PAGE_SIZE).links("/admin/segments", &q, 250);
        assert!(links.contains("<strong>1</strong>"));
        assert!(links.contains(r#"href="/admin/segments?transcribed=no&amp;p=3""#));
        assert!(links.contains("250 total"));
    }

    #[test]
    fn test_pagination_huge_page_size() {
        let p = calculate_pagination(120, 5, i64::MAX);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 1);
        assert_eq!(p.offset, 0);

        let p = calculate_pagination(i64::MAX, i64::MAX, 2);
        assert_eq!(p.total_pages, i64::MAX / 2 + 1);
    }

    #[test]
    fn test_parse_page() {
        assert_eq!(parse_page(Some("3")), 3);
        assert_eq!(parse_page(Some("x")), 1);
        assert_eq!(parse_page(None), 1);
    }
}

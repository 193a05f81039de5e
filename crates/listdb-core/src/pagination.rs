//! Page arithmetic.
//!
//! Pages are 1-based. All functions are total: non-positive limits and
//! totals collapse to a single page at offset 0.

use serde::{Deserialize, Serialize};

/// Pagination metadata for a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub total_items: i64,
    pub items_per_page: i64,
    pub current_page: i64,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// Number of pages needed for `total` items, at least 1.
pub fn pages_quantity(limit: i64, total: i64) -> i64 {
    if limit <= 0 || total <= 0 {
        return 1;
    }
    (total - 1) / limit + 1
}

/// Offset of the first item on `page`.
pub fn offset(limit: i64, page: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    page.saturating_sub(1).saturating_mul(limit).max(0)
}

/// Clamp `page` into `[1, total_pages]`.
pub fn normalize_page(page: i64, total_pages: i64) -> i64 {
    page.min(total_pages).max(1)
}

/// Build the metadata for `current_page`, clamped to the valid range.
pub fn metadata(limit: i64, total: i64, current_page: i64) -> PageMeta {
    let total_pages = pages_quantity(limit, total);
    let current_page = normalize_page(current_page, total_pages);

    PageMeta {
        total_items: total.max(0),
        items_per_page: limit,
        current_page,
        total_pages,
        has_next_page: current_page < total_pages,
        has_previous_page: current_page > 1,
    }
}

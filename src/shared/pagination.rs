//! Pagination helpers for list endpoints

/// Clamp raw pagination query parameters to sane bounds.
pub fn validate_pagination(page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(20).clamp(1, 100);
    (page, limit)
}

/// Paginated response wrapper
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = total.div_ceil(limit.max(1));
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }

    /// Slice a fully materialised collection into one page.
    pub fn paginate(mut items: Vec<T>, page: u64, limit: u64) -> Self {
        let total = items.len() as u64;
        let start = ((page - 1) * limit).min(total) as usize;
        let end = (start + limit as usize).min(items.len());
        let page_items = items.drain(start..end).collect();
        Self::new(page_items, total, page, limit)
    }
}

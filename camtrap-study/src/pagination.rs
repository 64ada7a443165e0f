//! Limit/offset pagination for list endpoints

/// Page size when the caller gives none
pub const DEFAULT_LIMIT: i64 = 50;

/// Largest page a caller may request
pub const MAX_LIMIT: i64 = 500;

/// Sanitized limit/offset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Rows per page, within `[1, MAX_LIMIT]`
    pub limit: i64,
    /// Rows to skip, never negative
    pub offset: i64,
}

impl Pagination {
    /// Whether rows remain after this page
    pub fn has_more(&self, total: i64) -> bool {
        self.offset + self.limit < total
    }
}

/// Calculate pagination from optional caller values
///
/// # Examples
/// ```
/// use camtrap_study::pagination::calculate_pagination;
///
/// let p = calculate_pagination(None, None);
/// assert_eq!(p.limit, 50);
/// assert_eq!(p.offset, 0);
///
/// // Out-of-bounds values get clamped
/// let p = calculate_pagination(Some(10_000), Some(-5));
/// assert_eq!(p.limit, 500);
/// assert_eq!(p.offset, 0);
/// ```
pub fn calculate_pagination(limit: Option<i64>, offset: Option<i64>) -> Pagination {
    Pagination {
        limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        offset: offset.unwrap_or(0).max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let p = calculate_pagination(None, None);
        assert_eq!(p, Pagination { limit: DEFAULT_LIMIT, offset: 0 });
    }

    #[test]
    fn test_pagination_out_of_bounds_low() {
        let p = calculate_pagination(Some(0), Some(-1));
        assert_eq!(p.limit, 1);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_out_of_bounds_high() {
        let p = calculate_pagination(Some(MAX_LIMIT + 1), Some(40));
        assert_eq!(p.limit, MAX_LIMIT);
        assert_eq!(p.offset, 40);
    }

    #[test]
    fn test_has_more() {
        let p = calculate_pagination(Some(3), Some(0));
        assert!(p.has_more(9));
        assert!(!p.has_more(3));

        let last = calculate_pagination(Some(3), Some(6));
        assert!(!last.has_more(9));
    }
}

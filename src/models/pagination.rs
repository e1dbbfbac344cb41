use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::booking::SafeBooking;
use super::listing::SafeListing;
use super::user::SafeUser;

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 50;

#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
#[schema(example = json!({
    "page": 1,
    "per_page": 20
}))]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}
fn default_per_page() -> i64 {
    DEFAULT_PER_PAGE
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationParams {
    /// Page number, at least 1
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    /// Page size clamped to 1..=50
    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// Rows to skip; saturates instead of overflowing on absurd page numbers
    pub fn offset(&self) -> i64 {
        self.page().saturating_sub(1).saturating_mul(self.limit())
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[aliases(
    PaginatedListings = Paginated<SafeListing>,
    PaginatedUsers = Paginated<SafeUser>,
    PaginatedBookings = Paginated<SafeBooking>
)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, params: &PaginationParams) -> Self {
        let per_page = params.limit();
        Self {
            items,
            total,
            page: params.page(),
            per_page,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_page_clamped_to_fifty() {
        let params = PaginationParams {
            page: 1,
            per_page: 500,
        };
        assert_eq!(params.limit(), 50);

        let params = PaginationParams {
            page: 1,
            per_page: 0,
        };
        assert_eq!(params.limit(), 1);
    }

    #[test]
    fn test_offset_and_page_floor() {
        let params = PaginationParams {
            page: 3,
            per_page: 20,
        };
        assert_eq!(params.offset(), 40);

        let params = PaginationParams {
            page: -4,
            per_page: 20,
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_huge_page_saturates() {
        let params = PaginationParams {
            page: i64::MAX,
            per_page: 20,
        };
        assert_eq!(params.offset(), i64::MAX);
        assert!(params.offset() >= 0);
    }

    #[test]
    fn test_total_pages() {
        let params = PaginationParams::default();
        assert_eq!(Paginated::<u8>::new(vec![], 0, &params).total_pages, 0);
        assert_eq!(Paginated::<u8>::new(vec![], 20, &params).total_pages, 1);
        assert_eq!(Paginated::<u8>::new(vec![], 41, &params).total_pages, 3);
    }
}

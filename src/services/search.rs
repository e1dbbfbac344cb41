// Listing search: keyword, facet and availability filters with pagination

use diesel::dsl::{exists, not};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::instrument;

use crate::{
    db::DieselPool,
    models::{
        BookingStatus, DateRange, Listing, ListingSearchQuery, Paginated, PaginationParams,
        SafeListing,
    },
    schema::{bookings, listings},
    utils::service_error::ServiceError,
};

/// Search filters after validation
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<i32>,
    pub max_price: Option<i32>,
    pub guest_count: Option<i32>,
    pub available: Option<DateRange>,
    pub user_id: Option<uuid::Uuid>,
}

/// Escape LIKE wildcards so user input matches literally
fn like_pattern(input: &str) -> String {
    let escaped = input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl SearchFilters {
    pub fn from_query(
        query: &ListingSearchQuery,
    ) -> Result<(Self, PaginationParams), ServiceError> {
        if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
            if min > max {
                return Err(ServiceError::ValidationError(
                    "min_price must not exceed max_price".to_string(),
                ));
            }
        }

        if matches!(query.guest_count, Some(g) if g < 1) {
            return Err(ServiceError::ValidationError(
                "guest_count must be at least 1".to_string(),
            ));
        }

        let available = match (query.start_date, query.end_date) {
            (Some(start), Some(end)) => {
                Some(DateRange::new(start, end).map_err(ServiceError::ValidationError)?)
            },
            (None, None) => None,
            _ => {
                return Err(ServiceError::ValidationError(
                    "start_date and end_date must be given together".to_string(),
                ))
            },
        };

        let pagination = PaginationParams {
            page: query.page.unwrap_or(1),
            per_page: query
                .per_page
                .unwrap_or(crate::models::pagination::DEFAULT_PER_PAGE),
        };

        Ok((
            Self {
                keyword: non_empty(&query.q),
                category: non_empty(&query.category).map(|c| c.to_lowercase()),
                location: non_empty(&query.location),
                min_price: query.min_price,
                max_price: query.max_price,
                guest_count: query.guest_count,
                available,
                user_id: query.user_id,
            },
            pagination,
        ))
    }

    fn to_query(&self) -> listings::BoxedQuery<'static, Pg> {
        let mut query = listings::table.into_boxed();

        if let Some(keyword) = &self.keyword {
            let pattern = like_pattern(keyword);
            query = query.filter(
                listings::title
                    .ilike(pattern.clone())
                    .or(listings::description.ilike(pattern)),
            );
        }

        if let Some(category) = &self.category {
            query = query.filter(listings::category.eq(category.clone()));
        }

        if let Some(location) = &self.location {
            query = query.filter(listings::location.ilike(like_pattern(location)));
        }

        if let Some(min) = self.min_price {
            query = query.filter(listings::price_cents.ge(min));
        }

        if let Some(max) = self.max_price {
            query = query.filter(listings::price_cents.le(max));
        }

        if let Some(guests) = self.guest_count {
            query = query.filter(listings::max_guests.ge(guests));
        }

        if let Some(user_id) = self.user_id {
            query = query.filter(listings::user_id.eq(user_id));
        }

        if let Some(range) = self.available {
            query = query.filter(not(exists(
                bookings::table
                    .filter(bookings::listing_id.eq(listings::id))
                    .filter(bookings::status.ne(BookingStatus::Cancelled.as_str()))
                    .filter(bookings::start_date.lt(range.end))
                    .filter(bookings::end_date.gt(range.start)),
            )));
        }

        query
    }
}

#[derive(Clone)]
pub struct SearchService {
    diesel_pool: DieselPool,
}

impl SearchService {
    pub fn new(diesel_pool: DieselPool) -> Self {
        Self { diesel_pool }
    }

    /// Newest first, at most 50 per page
    #[instrument(skip(self))]
    pub async fn search_listings(
        &self,
        query: &ListingSearchQuery,
    ) -> Result<Paginated<SafeListing>, ServiceError> {
        let (filters, pagination) = SearchFilters::from_query(query)?;

        let mut conn = self.diesel_pool.get().await?;

        let total: i64 = filters.to_query().count().get_result(&mut conn).await?;

        let rows: Vec<Listing> = filters
            .to_query()
            .order((listings::created_at.desc(), listings::id.desc()))
            .limit(pagination.limit())
            .offset(pagination.offset())
            .select(Listing::as_select())
            .load(&mut conn)
            .await?;

        Ok(Paginated::new(
            rows.into_iter().map(SafeListing::from).collect(),
            total,
            &pagination,
        ))
    }
}

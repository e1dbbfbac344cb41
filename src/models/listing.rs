use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::user::PublicUser;
use crate::schema::listings;

// =============================================================================
// CATEGORY
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Outdoors,
    Water,
    Adventure,
    Food,
    Culture,
    Wellness,
    Sports,
    Nightlife,
    Workshops,
    Tours,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Outdoors,
        Category::Water,
        Category::Adventure,
        Category::Food,
        Category::Culture,
        Category::Wellness,
        Category::Sports,
        Category::Nightlife,
        Category::Workshops,
        Category::Tours,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Outdoors => "outdoors",
            Category::Water => "water",
            Category::Adventure => "adventure",
            Category::Food => "food",
            Category::Culture => "culture",
            Category::Wellness => "wellness",
            Category::Sports => "sports",
            Category::Nightlife => "nightlife",
            Category::Workshops => "workshops",
            Category::Tours => "tours",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("Invalid category: {}", s))
    }
}

pub fn validate_category(category: &str) -> Result<(), ValidationError> {
    Category::from_str(category).map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("category");
        err.message = Some("Unknown category".into());
        err
    })
}

// =============================================================================
// DATABASE MODELS
// =============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = listings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Listing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub image_src: String,
    pub category: String,
    pub location: String,
    /// Per guest per day
    pub price_cents: i32,
    pub max_guests: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = listings)]
pub struct NewListing {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub image_src: String,
    pub category: String,
    pub location: String,
    pub price_cents: i32,
    pub max_guests: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = listings)]
pub struct ListingUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_src: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub price_cents: Option<i32>,
    pub max_guests: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Listing {
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        listing_id: Uuid,
    ) -> QueryResult<Option<Self>> {
        listings::table
            .find(listing_id)
            .select(Listing::as_select())
            .first(conn)
            .await
            .optional()
    }

    /// Lock the listing row for the rest of the transaction
    pub async fn find_for_update(
        conn: &mut AsyncPgConnection,
        listing_id: Uuid,
    ) -> QueryResult<Option<Self>> {
        listings::table
            .find(listing_id)
            .select(Listing::as_select())
            .for_update()
            .first(conn)
            .await
            .optional()
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}

// =============================================================================
// REQUEST / RESPONSE TYPES
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "title": "Sunrise kayak tour",
    "description": "Two hours paddling along the cliffs with a local guide.",
    "image_src": "https://cdn.example.com/uploads/kayak.jpg",
    "category": "water",
    "location": "Lisbon, Portugal",
    "price_cents": 4500,
    "max_guests": 8
}))]
pub struct CreateListingRequest {
    #[validate(length(min = 1, max = 120, message = "Title must be 1-120 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 5000, message = "Description must be 1-5000 characters"))]
    pub description: String,

    #[validate(url(message = "Image must be a valid URL"))]
    pub image_src: String,

    #[validate(custom = "validate_category")]
    pub category: String,

    #[validate(length(min = 1, max = 120, message = "Location must be 1-120 characters"))]
    pub location: String,

    #[validate(range(min = 1, message = "Price must be greater than zero"))]
    pub price_cents: i32,

    #[validate(range(min = 1, max = 100, message = "Max guests must be between 1 and 100"))]
    pub max_guests: i32,
}

/// Partial update, absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateListingRequest {
    #[validate(length(min = 1, max = 120, message = "Title must be 1-120 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 5000, message = "Description must be 1-5000 characters"))]
    pub description: Option<String>,

    #[validate(url(message = "Image must be a valid URL"))]
    pub image_src: Option<String>,

    #[validate(custom = "validate_category")]
    pub category: Option<String>,

    #[validate(length(min = 1, max = 120, message = "Location must be 1-120 characters"))]
    pub location: Option<String>,

    #[validate(range(min = 1, message = "Price must be greater than zero"))]
    pub price_cents: Option<i32>,

    #[validate(range(min = 1, max = 100, message = "Max guests must be between 1 and 100"))]
    pub max_guests: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
pub struct ListingSearchQuery {
    /// Keyword matched against title and description
    pub q: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<i32>,
    pub max_price: Option<i32>,
    pub guest_count: Option<i32>,
    /// Inclusive start of the wanted stay, `YYYY-MM-DD`
    pub start_date: Option<NaiveDate>,
    /// Exclusive end of the wanted stay
    pub end_date: Option<NaiveDate>,
    pub user_id: Option<Uuid>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SafeListing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub image_src: String,
    pub category: String,
    pub location: String,
    pub price_cents: i32,
    pub max_guests: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Listing> for SafeListing {
    fn from(listing: Listing) -> Self {
        Self {
            id: listing.id,
            user_id: listing.user_id,
            title: listing.title,
            description: listing.description,
            image_src: listing.image_src,
            category: listing.category,
            location: listing.location,
            price_cents: listing.price_cents,
            max_guests: listing.max_guests,
            created_at: listing.created_at.to_rfc3339(),
            updated_at: listing.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: i64,
}

impl RatingSummary {
    pub fn from_ratings(ratings: &[i32]) -> Self {
        if ratings.is_empty() {
            return Self {
                average: None,
                count: 0,
            };
        }

        let sum: i64 = ratings.iter().map(|r| *r as i64).sum();
        let average = sum as f64 / ratings.len() as f64;
        Self {
            average: Some((average * 10.0).round() / 10.0),
            count: ratings.len() as i64,
        }
    }
}

/// Dates taken by an active booking, end exclusive
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookedRange {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ListingDetail {
    #[serde(flatten)]
    pub listing: SafeListing,
    pub owner: PublicUser,
    pub rating: RatingSummary,
    pub booked_ranges: Vec<BookedRange>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfileResponse {
    pub user: PublicUser,
    pub listings: Vec<SafeListing>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreateListingRequest {
        CreateListingRequest {
            title: "Sunrise kayak tour".into(),
            description: "Paddle along the cliffs".into(),
            image_src: "https://cdn.example.com/kayak.jpg".into(),
            category: "water".into(),
            location: "Lisbon".into(),
            price_cents: 4500,
            max_guests: 8,
        }
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(Category::from_str("Water"), Ok(Category::Water));
        assert_eq!(Category::from_str(" tours "), Ok(Category::Tours));
        assert!(Category::from_str("castles").is_err());
    }

    #[test]
    fn test_create_listing_validation() {
        assert!(valid_request().validate().is_ok());

        let mut request = valid_request();
        request.category = "castles".into();
        assert!(request.validate().is_err());

        let mut request = valid_request();
        request.price_cents = 0;
        assert!(request.validate().is_err());

        let mut request = valid_request();
        request.max_guests = 101;
        assert!(request.validate().is_err());

        let mut request = valid_request();
        request.image_src = "not a url".into();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_rating_summary() {
        let empty = RatingSummary::from_ratings(&[]);
        assert_eq!(empty.count, 0);
        assert!(empty.average.is_none());

        let summary = RatingSummary::from_ratings(&[5, 4, 4]);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average, Some(4.3));
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::listing::SafeListing;
use crate::schema::bookings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(format!("Invalid booking status: {}", s)),
        }
    }
}

/// Half-open date range `[start, end)`; a stay ending on a day frees that day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if end <= start {
            return Err("End date must be after start date".to_string());
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// `price_cents × days × guest_count`, None on overflow
pub fn calculate_total_price(
    price_cents: i32,
    range: &DateRange,
    guest_count: i32,
) -> Option<i64> {
    (price_cents as i64)
        .checked_mul(range.days())?
        .checked_mul(guest_count as i64)
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub listing_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub guest_count: i32,
    pub total_price_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bookings)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub listing_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub guest_count: i32,
    pub total_price_cents: i64,
    pub status: String,
}

impl Booking {
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        booking_id: Uuid,
    ) -> QueryResult<Option<Self>> {
        bookings::table
            .find(booking_id)
            .select(Booking::as_select())
            .first(conn)
            .await
            .optional()
    }

    pub async fn set_status(
        conn: &mut AsyncPgConnection,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> QueryResult<Self> {
        diesel::update(bookings::table.find(booking_id))
            .set((
                bookings::status.eq(status.as_str()),
                bookings::updated_at.eq(Utc::now()),
            ))
            .returning(Booking::as_returning())
            .get_result(conn)
            .await
    }

    /// Non-cancelled bookings of a listing
    pub async fn active_for_listing(
        conn: &mut AsyncPgConnection,
        listing: Uuid,
    ) -> QueryResult<Vec<Self>> {
        bookings::table
            .filter(bookings::listing_id.eq(listing))
            .filter(bookings::status.ne(BookingStatus::Cancelled.as_str()))
            .order(bookings::start_date.asc())
            .select(Booking::as_select())
            .load(conn)
            .await
    }

    pub fn status_enum(&self) -> BookingStatus {
        BookingStatus::from_str(&self.status).unwrap_or_else(|e| {
            tracing::warn!("{} on booking {}, treating as cancelled", e, self.id);
            BookingStatus::Cancelled
        })
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "listing_id": "6a1f0b0e-6f7e-4f0c-9a55-2c7d1c0b9f11",
    "start_date": "2025-07-01",
    "end_date": "2025-07-03",
    "guest_count": 2
}))]
pub struct CreateBookingRequest {
    pub listing_id: Uuid,
    pub start_date: NaiveDate,
    /// Exclusive
    pub end_date: NaiveDate,
    #[validate(range(min = 1, message = "Guest count must be at least 1"))]
    pub guest_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SafeBooking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub listing_id: Uuid,
    pub start_date: String,
    pub end_date: String,
    pub guest_count: i32,
    pub total_price_cents: i64,
    pub status: BookingStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for SafeBooking {
    fn from(booking: Booking) -> Self {
        let status = booking.status_enum();
        Self {
            id: booking.id,
            user_id: booking.user_id,
            listing_id: booking.listing_id,
            start_date: booking.start_date.format("%Y-%m-%d").to_string(),
            end_date: booking.end_date.format("%Y-%m-%d").to_string(),
            guest_count: booking.guest_count,
            total_price_cents: booking.total_price_cents,
            status,
            created_at: booking.created_at.to_rfc3339(),
            updated_at: booking.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookingWithListing {
    #[serde(flatten)]
    pub booking: SafeBooking,
    pub listing: SafeListing,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    #[test]
    fn test_overlap_predicate() {
        let booked = range("2025-07-10", "2025-07-15");

        assert!(booked.overlaps(&range("2025-07-12", "2025-07-13")));
        assert!(booked.overlaps(&range("2025-07-08", "2025-07-11")));
        assert!(booked.overlaps(&range("2025-07-14", "2025-07-20")));
        assert!(booked.overlaps(&range("2025-07-01", "2025-07-30")));
    }

    #[test]
    fn test_adjacent_ranges_do_not_overlap() {
        let booked = range("2025-07-10", "2025-07-15");

        assert!(!booked.overlaps(&range("2025-07-15", "2025-07-17")));
        assert!(!booked.overlaps(&range("2025-07-05", "2025-07-10")));
    }

    #[test]
    fn test_range_requires_end_after_start() {
        assert!(DateRange::new(date("2025-07-10"), date("2025-07-10")).is_err());
        assert!(DateRange::new(date("2025-07-10"), date("2025-07-09")).is_err());
    }

    #[test]
    fn test_total_price() {
        let stay = range("2025-07-10", "2025-07-13");
        assert_eq!(stay.days(), 3);
        assert_eq!(calculate_total_price(4500, &stay, 2), Some(27_000));
        assert_eq!(calculate_total_price(i32::MAX, &stay, i32::MAX), None);
    }

    #[test]
    fn test_safe_booking_dates_are_plain_strings() {
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            start_date: date("2025-07-10"),
            end_date: date("2025-07-12"),
            guest_count: 2,
            total_price_cents: 18_000,
            status: "confirmed".into(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(SafeBooking::from(booking)).unwrap();

        assert_eq!(json["start_date"], "2025-07-10");
        assert_eq!(json["end_date"], "2025-07-12");
        assert_eq!(json["status"], "confirmed");
    }
}

use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, RunQueryDsl};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DieselPool,
    models::{
        calculate_total_price, Booking, BookingStatus, BookingWithListing, CreateBookingRequest,
        DateRange, Listing, NewBooking, Paginated, PaginationParams, SafeBooking, SafeListing,
    },
    schema::{bookings, listings},
    services::{
        listing::Actor,
        metrics,
        payment::{settle_cancelled_booking, Settlement},
        stripe::PaymentGateway,
    },
    utils::{
        audit_logger::{AuditAction, AuditLogger},
        service_error::ServiceError,
    },
};

/// Checks that need no database access: range, start date and guest count
pub fn check_booking_request(
    request: &CreateBookingRequest,
    listing: &Listing,
    guest_id: Uuid,
    today: NaiveDate,
) -> Result<DateRange, ServiceError> {
    let range = DateRange::new(request.start_date, request.end_date)
        .map_err(ServiceError::ValidationError)?;

    if range.start < today {
        return Err(ServiceError::ValidationError(
            "Start date cannot be in the past".to_string(),
        ));
    }

    if listing.is_owned_by(guest_id) {
        return Err(ServiceError::ValidationError(
            "You cannot book your own listing".to_string(),
        ));
    }

    if request.guest_count < 1 || request.guest_count > listing.max_guests {
        return Err(ServiceError::ValidationError(format!(
            "Guest count must be between 1 and {}",
            listing.max_guests
        )));
    }

    Ok(range)
}

#[derive(Clone)]
pub struct BookingService {
    diesel_pool: DieselPool,
    payments: Arc<dyn PaymentGateway>,
}

impl BookingService {
    pub fn new(diesel_pool: DieselPool, payments: Arc<dyn PaymentGateway>) -> Self {
        Self {
            diesel_pool,
            payments,
        }
    }

    /// Reserve a listing for a date range.
    ///
    /// The listing row is locked while existing bookings are checked so two
    /// concurrent requests for the same dates cannot both succeed.
    #[instrument(skip(self, request), fields(listing_id = %request.listing_id))]
    pub async fn create_booking(
        &self,
        guest_id: Uuid,
        request: CreateBookingRequest,
    ) -> Result<SafeBooking, ServiceError> {
        request.validate()?;

        let mut conn = self.diesel_pool.get().await?;
        let today = Utc::now().date_naive();

        let booking = conn
            .transaction::<_, ServiceError, _>(|tx| {
                async move {
                    let listing = Listing::find_for_update(tx, request.listing_id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Listing"))?;

                    let range = check_booking_request(&request, &listing, guest_id, today)?;

                    let taken = Booking::active_for_listing(tx, listing.id).await?;
                    if taken.iter().any(|b| b.range().overlaps(&range)) {
                        return Err(ServiceError::Conflict(
                            "Listing is not available for these dates".to_string(),
                        ));
                    }

                    let total_price_cents =
                        calculate_total_price(listing.price_cents, &range, request.guest_count)
                            .ok_or_else(|| {
                                ServiceError::ValidationError(
                                    "Booking total is too large".to_string(),
                                )
                            })?;

                    let new_booking = NewBooking {
                        user_id: guest_id,
                        listing_id: listing.id,
                        start_date: range.start,
                        end_date: range.end,
                        guest_count: request.guest_count,
                        total_price_cents,
                        status: BookingStatus::Pending.as_str().to_string(),
                    };

                    let booking: Booking = diesel::insert_into(bookings::table)
                        .values(&new_booking)
                        .returning(Booking::as_returning())
                        .get_result(tx)
                        .await?;
                    Ok(booking)
                }
                .scope_boxed()
            })
            .await?;

        AuditLogger::log(
            AuditAction::BookingCreated,
            Some(guest_id),
            booking.id,
            Some(format!("{} to {}", booking.start_date, booking.end_date)),
        );
        metrics::record_booking_created();

        Ok(booking.into())
    }

    /// Bookings made by the caller, newest first
    pub async fn get_user_bookings(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<BookingWithListing>, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let rows: Vec<(Booking, Listing)> = bookings::table
            .inner_join(listings::table)
            .filter(bookings::user_id.eq(user_id))
            .order(bookings::created_at.desc())
            .select((Booking::as_select(), Listing::as_select()))
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(with_listing).collect())
    }

    /// Bookings other users made on the caller's listings
    pub async fn get_hosting_bookings(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<BookingWithListing>, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let rows: Vec<(Booking, Listing)> = bookings::table
            .inner_join(listings::table)
            .filter(listings::user_id.eq(owner_id))
            .order(bookings::start_date.asc())
            .select((Booking::as_select(), Listing::as_select()))
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(with_listing).collect())
    }

    /// Visible to the guest and the listing owner
    pub async fn get_booking(
        &self,
        actor: Actor,
        booking_id: Uuid,
    ) -> Result<BookingWithListing, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let (booking, listing): (Booking, Listing) = bookings::table
            .inner_join(listings::table)
            .filter(bookings::id.eq(booking_id))
            .select((Booking::as_select(), Listing::as_select()))
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;

        if booking.user_id != actor.id && !listing.is_owned_by(actor.id) && !actor.is_admin {
            warn!(user_id = %actor.id, %booking_id, "Access to another user's booking refused");
            return Err(ServiceError::Forbidden(
                "You do not have access to this booking".to_string(),
            ));
        }

        Ok(with_listing((booking, listing)))
    }

    /// Cancel as the guest or the host. A completed payment is refunded and an
    /// open one is voided with the provider, together with the status change.
    #[instrument(skip(self))]
    pub async fn cancel_booking(
        &self,
        actor: Actor,
        booking_id: Uuid,
    ) -> Result<SafeBooking, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;
        let gateway = self.payments.clone();

        let (booking, settlement) = conn
            .transaction::<_, ServiceError, _>(|tx| {
                async move {
                    let booking: Booking = bookings::table
                        .find(booking_id)
                        .select(Booking::as_select())
                        .for_update()
                        .first(tx)
                        .await
                        .optional()?
                        .ok_or_else(|| ServiceError::not_found("Booking"))?;

                    let listing = Listing::find_by_id(tx, booking.listing_id)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Listing"))?;

                    if booking.user_id != actor.id && !listing.is_owned_by(actor.id) {
                        warn!(user_id = %actor.id, %booking_id, "Cancel of another user's booking refused");
                        return Err(ServiceError::Forbidden(
                            "You can only cancel your own bookings".to_string(),
                        ));
                    }

                    if booking.status_enum() == BookingStatus::Cancelled {
                        return Err(ServiceError::ValidationError(
                            "Booking is already cancelled".to_string(),
                        ));
                    }

                    let settlement =
                        settle_cancelled_booking(tx, gateway.as_ref(), booking.id).await?;

                    let booking = Booking::set_status(tx, booking.id, BookingStatus::Cancelled).await?;
                    Ok((booking, settlement))
                }
                .scope_boxed()
            })
            .await?;

        AuditLogger::log(AuditAction::BookingCancelled, Some(actor.id), booking.id, None);
        match settlement {
            Some(Settlement::Refunded(payment)) => {
                AuditLogger::log(AuditAction::PaymentRefunded, Some(actor.id), payment.id, None);
                info!("Payment {} refunded for cancelled booking {}", payment.id, booking.id);
            },
            Some(Settlement::Voided(payment)) => {
                AuditLogger::log(
                    AuditAction::PaymentFailed,
                    Some(actor.id),
                    payment.id,
                    payment.failure_reason.clone(),
                );
                info!("Open payment {} voided for cancelled booking {}", payment.id, booking.id);
            },
            None => {},
        }

        Ok(booking.into())
    }

    /// Every booking on the platform, for the admin dashboard
    pub async fn list_all_bookings(
        &self,
        pagination: &PaginationParams,
    ) -> Result<Paginated<SafeBooking>, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let total: i64 = bookings::table.count().get_result(&mut conn).await?;

        let rows: Vec<Booking> = bookings::table
            .order((bookings::created_at.desc(), bookings::id.desc()))
            .limit(pagination.limit())
            .offset(pagination.offset())
            .select(Booking::as_select())
            .load(&mut conn)
            .await?;

        Ok(Paginated::new(
            rows.into_iter().map(SafeBooking::from).collect(),
            total,
            pagination,
        ))
    }
}

fn with_listing((booking, listing): (Booking, Listing)) -> BookingWithListing {
    BookingWithListing {
        booking: booking.into(),
        listing: SafeListing::from(listing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn listing(owner: Uuid) -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::new_v4(),
            user_id: owner,
            title: "Cliff walk".into(),
            description: "Coastal hike".into(),
            image_src: "https://cdn.example.com/walk.jpg".into(),
            category: "outdoors".into(),
            location: "Porto".into(),
            price_cents: 3000,
            max_guests: 4,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(listing_id: Uuid, start: &str, end: &str, guests: i32) -> CreateBookingRequest {
        CreateBookingRequest {
            listing_id,
            start_date: date(start),
            end_date: date(end),
            guest_count: guests,
        }
    }

    #[test]
    fn test_valid_request() {
        let listing = listing(Uuid::new_v4());
        let req = request(listing.id, "2030-06-01", "2030-06-04", 2);

        let range = check_booking_request(&req, &listing, Uuid::new_v4(), date("2030-05-01")).unwrap();
        assert_eq!(range.days(), 3);
    }

    #[test]
    fn test_past_start_is_rejected() {
        let listing = listing(Uuid::new_v4());
        let req = request(listing.id, "2030-04-30", "2030-05-02", 1);

        assert!(matches!(
            check_booking_request(&req, &listing, Uuid::new_v4(), date("2030-05-01")),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn test_own_listing_is_rejected() {
        let owner = Uuid::new_v4();
        let listing = listing(owner);
        let req = request(listing.id, "2030-06-01", "2030-06-02", 1);

        assert!(check_booking_request(&req, &listing, owner, date("2030-05-01")).is_err());
    }

    #[test]
    fn test_guest_count_above_capacity_is_rejected() {
        let listing = listing(Uuid::new_v4());
        let req = request(listing.id, "2030-06-01", "2030-06-02", 5);

        assert!(check_booking_request(&req, &listing, Uuid::new_v4(), date("2030-05-01")).is_err());
    }

    #[test]
    fn test_empty_range_is_rejected() {
        let listing = listing(Uuid::new_v4());
        let req = request(listing.id, "2030-06-02", "2030-06-02", 1);

        assert!(check_booking_request(&req, &listing, Uuid::new_v4(), date("2030-05-01")).is_err());
    }
}

use chrono::Utc;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::RunQueryDsl;
use tracing::{instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DieselPool,
    models::{BookingStatus, CreateReviewRequest, Listing, NewReview, Review, SafeReview},
    schema::{bookings, reviews, users},
    services::listing::Actor,
    utils::{
        audit_logger::{AuditAction, AuditLogger},
        service_error::ServiceError,
    },
};

#[derive(Clone)]
pub struct ReviewService {
    diesel_pool: DieselPool,
}

impl ReviewService {
    pub fn new(diesel_pool: DieselPool) -> Self {
        Self { diesel_pool }
    }

    /// Reviews with author names, newest first
    pub async fn get_listing_reviews(&self, listing_id: Uuid) -> Result<Vec<SafeReview>, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        if Listing::find_by_id(&mut conn, listing_id).await?.is_none() {
            return Err(ServiceError::not_found("Listing"));
        }

        let rows: Vec<(Review, String, Option<String>)> = reviews::table
            .inner_join(users::table)
            .filter(reviews::listing_id.eq(listing_id))
            .order(reviews::created_at.desc())
            .select((Review::as_select(), users::name, users::image))
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(review, name, image)| SafeReview::new(review, name, image))
            .collect())
    }

    /// Only guests whose stay has ended may review, once per listing
    #[instrument(skip(self, request))]
    pub async fn create_review(
        &self,
        user_id: Uuid,
        listing_id: Uuid,
        request: CreateReviewRequest,
    ) -> Result<SafeReview, ServiceError> {
        request.validate()?;

        let mut conn = self.diesel_pool.get().await?;

        let listing = Listing::find_by_id(&mut conn, listing_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Listing"))?;

        if listing.is_owned_by(user_id) {
            return Err(ServiceError::Forbidden(
                "You cannot review your own listing".to_string(),
            ));
        }

        let today = Utc::now().date_naive();
        let has_stayed: bool = diesel::select(exists(
            bookings::table
                .filter(bookings::listing_id.eq(listing_id))
                .filter(bookings::user_id.eq(user_id))
                .filter(bookings::status.ne(BookingStatus::Cancelled.as_str()))
                .filter(bookings::end_date.le(today)),
        ))
        .get_result(&mut conn)
        .await?;

        if !has_stayed {
            warn!(%user_id, %listing_id, "Review without a completed stay refused");
            return Err(ServiceError::Forbidden(
                "You can only review activities you have completed".to_string(),
            ));
        }

        let new_review = NewReview {
            listing_id,
            user_id,
            rating: request.rating,
            comment: request.comment.trim().to_string(),
        };

        let review: Review = match diesel::insert_into(reviews::table)
            .values(&new_review)
            .returning(Review::as_returning())
            .get_result(&mut conn)
            .await
        {
            Ok(review) => review,
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                return Err(ServiceError::Conflict(
                    "You have already reviewed this listing".to_string(),
                ))
            },
            Err(e) => return Err(e.into()),
        };

        let (name, image): (String, Option<String>) = users::table
            .find(user_id)
            .select((users::name, users::image))
            .first(&mut conn)
            .await?;

        AuditLogger::log(
            AuditAction::ReviewCreated,
            Some(user_id),
            review.id,
            Some(format!("rating {}", review.rating)),
        );

        Ok(SafeReview::new(review, name, image))
    }

    /// Author or admin
    #[instrument(skip(self))]
    pub async fn delete_review(&self, actor: Actor, review_id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let review: Review = reviews::table
            .find(review_id)
            .select(Review::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| ServiceError::not_found("Review"))?;

        if review.user_id != actor.id && !actor.is_admin {
            warn!(user_id = %actor.id, %review_id, "Delete of another user's review refused");
            return Err(ServiceError::Forbidden(
                "You can only delete your own reviews".to_string(),
            ));
        }

        diesel::delete(reviews::table.find(review_id))
            .execute(&mut conn)
            .await?;

        AuditLogger::log(AuditAction::ReviewDeleted, Some(actor.id), review_id, None);
        Ok(())
    }
}

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DieselPool,
    models::{
        BookedRange, Booking, CreateListingRequest, Listing, ListingDetail, ListingUpdate,
        NewListing, PublicUser, RatingSummary, SafeListing, UpdateListingRequest, User,
        UserProfileResponse,
    },
    schema::{listings, reviews},
    utils::{
        audit_logger::{AuditAction, AuditLogger},
        service_error::ServiceError,
    },
};

/// Identity of the caller as far as ownership checks are concerned
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: Uuid,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct ListingService {
    diesel_pool: DieselPool,
}

impl ListingService {
    pub fn new(diesel_pool: DieselPool) -> Self {
        Self { diesel_pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create_listing(
        &self,
        owner_id: Uuid,
        request: CreateListingRequest,
    ) -> Result<SafeListing, ServiceError> {
        request.validate()?;

        let mut conn = self.diesel_pool.get().await?;

        let new_listing = NewListing {
            user_id: owner_id,
            title: request.title.trim().to_string(),
            description: request.description.trim().to_string(),
            image_src: request.image_src,
            category: request.category.trim().to_lowercase(),
            location: request.location.trim().to_string(),
            price_cents: request.price_cents,
            max_guests: request.max_guests,
        };

        let listing: Listing = diesel::insert_into(listings::table)
            .values(&new_listing)
            .returning(Listing::as_returning())
            .get_result(&mut conn)
            .await?;

        AuditLogger::log(
            AuditAction::ListingCreated,
            Some(owner_id),
            listing.id,
            Some(listing.title.clone()),
        );

        Ok(listing.into())
    }

    /// Listing with owner, rating summary and the date ranges already taken
    #[instrument(skip(self))]
    pub async fn get_listing_detail(&self, listing_id: Uuid) -> Result<ListingDetail, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let listing = Listing::find_by_id(&mut conn, listing_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Listing"))?;

        let owner = User::find_by_id(&mut conn, listing.user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Listing owner"))?;

        let ratings: Vec<i32> = reviews::table
            .filter(reviews::listing_id.eq(listing_id))
            .select(reviews::rating)
            .load(&mut conn)
            .await?;

        let today = Utc::now().date_naive();
        let booked_ranges = Booking::active_for_listing(&mut conn, listing_id)
            .await?
            .into_iter()
            .filter(|b| b.end_date > today)
            .map(|b| BookedRange {
                start_date: b.start_date.format("%Y-%m-%d").to_string(),
                end_date: b.end_date.format("%Y-%m-%d").to_string(),
            })
            .collect();

        Ok(ListingDetail {
            owner: PublicUser::from(&owner),
            rating: RatingSummary::from_ratings(&ratings),
            booked_ranges,
            listing: listing.into(),
        })
    }

    /// Partial update by the owner
    #[instrument(skip(self, request))]
    pub async fn update_listing(
        &self,
        actor: Actor,
        listing_id: Uuid,
        request: UpdateListingRequest,
    ) -> Result<SafeListing, ServiceError> {
        request.validate()?;

        let mut conn = self.diesel_pool.get().await?;

        let existing = Listing::find_by_id(&mut conn, listing_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Listing"))?;

        if !existing.is_owned_by(actor.id) {
            warn!(user_id = %actor.id, %listing_id, "Update of another user's listing refused");
            return Err(ServiceError::Forbidden(
                "You can only edit your own listings".to_string(),
            ));
        }

        let update = ListingUpdate {
            title: request.title.map(|t| t.trim().to_string()),
            description: request.description.map(|d| d.trim().to_string()),
            image_src: request.image_src,
            category: request.category.map(|c| c.trim().to_lowercase()),
            location: request.location.map(|l| l.trim().to_string()),
            price_cents: request.price_cents,
            max_guests: request.max_guests,
            updated_at: Some(Utc::now()),
        };

        let listing: Listing = diesel::update(listings::table.find(listing_id))
            .set(&update)
            .returning(Listing::as_returning())
            .get_result(&mut conn)
            .await?;

        AuditLogger::log(AuditAction::ListingUpdated, Some(actor.id), listing_id, None);

        Ok(listing.into())
    }

    /// Hard delete; bookings, reviews and favorites go with it
    #[instrument(skip(self))]
    pub async fn delete_listing(&self, actor: Actor, listing_id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let existing = Listing::find_by_id(&mut conn, listing_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Listing"))?;

        if !existing.is_owned_by(actor.id) && !actor.is_admin {
            warn!(user_id = %actor.id, %listing_id, "Delete of another user's listing refused");
            return Err(ServiceError::Forbidden(
                "You can only delete your own listings".to_string(),
            ));
        }

        diesel::delete(listings::table.find(listing_id))
            .execute(&mut conn)
            .await?;

        AuditLogger::log(
            AuditAction::ListingDeleted,
            Some(actor.id),
            listing_id,
            Some(existing.title),
        );
        info!("Listing {} deleted by user {}", listing_id, actor.id);

        Ok(())
    }

    pub async fn get_user_listings(&self, user_id: Uuid) -> Result<Vec<SafeListing>, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let rows: Vec<Listing> = listings::table
            .filter(listings::user_id.eq(user_id))
            .order(listings::created_at.desc())
            .select(Listing::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(SafeListing::from).collect())
    }

    /// Public profile page: the user and everything they host
    pub async fn get_user_profile(&self, user_id: Uuid) -> Result<UserProfileResponse, ServiceError> {
        let user = {
            let mut conn = self.diesel_pool.get().await?;
            User::find_by_id(&mut conn, user_id)
                .await?
                .filter(|u| u.is_active)
                .ok_or_else(|| ServiceError::not_found("User"))?
        };

        Ok(UserProfileResponse {
            user: PublicUser::from(&user),
            listings: self.get_user_listings(user_id).await?,
        })
    }
}

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    db::DieselPool,
    models::{FavoriteToggleResponse, Listing, NewFavorite, SafeListing},
    schema::{favorites, listings},
    utils::service_error::ServiceError,
};

#[derive(Clone)]
pub struct FavoriteService {
    diesel_pool: DieselPool,
}

impl FavoriteService {
    pub fn new(diesel_pool: DieselPool) -> Self {
        Self { diesel_pool }
    }

    /// Remove the favorite when present, add it otherwise
    #[instrument(skip(self))]
    pub async fn toggle_favorite(
        &self,
        user_id: Uuid,
        listing_id: Uuid,
    ) -> Result<FavoriteToggleResponse, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        if Listing::find_by_id(&mut conn, listing_id).await?.is_none() {
            return Err(ServiceError::not_found("Listing"));
        }

        let removed = diesel::delete(
            favorites::table
                .filter(favorites::user_id.eq(user_id))
                .filter(favorites::listing_id.eq(listing_id)),
        )
        .execute(&mut conn)
        .await?;

        if removed > 0 {
            debug!("Listing {} unfavorited by {}", listing_id, user_id);
            return Ok(FavoriteToggleResponse {
                listing_id,
                favorited: false,
            });
        }

        diesel::insert_into(favorites::table)
            .values(&NewFavorite {
                user_id,
                listing_id,
            })
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;

        Ok(FavoriteToggleResponse {
            listing_id,
            favorited: true,
        })
    }

    /// Idempotent
    pub async fn remove_favorite(&self, user_id: Uuid, listing_id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        diesel::delete(
            favorites::table
                .filter(favorites::user_id.eq(user_id))
                .filter(favorites::listing_id.eq(listing_id)),
        )
        .execute(&mut conn)
        .await?;

        Ok(())
    }

    /// Favorited listings, most recently favorited first
    pub async fn get_favorites(&self, user_id: Uuid) -> Result<Vec<SafeListing>, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let rows: Vec<Listing> = favorites::table
            .inner_join(listings::table)
            .filter(favorites::user_id.eq(user_id))
            .order(favorites::created_at.desc())
            .select(Listing::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(SafeListing::from).collect())
    }
}

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use crate::{
    app::AppState,
    middleware::AuthenticatedUser,
    models::{FavoriteToggleResponse, SafeListing},
};

#[utoipa::path(
    post,
    path = "/v1/favorites/{listing_id}",
    tag = "Favorites",
    operation_id = "toggleFavorite",
    params(("listing_id" = Uuid, Path, description = "Listing ID")),
    responses(
        (status = 200, description = "New favorite state", body = FavoriteToggleResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 404, description = "Listing not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(listing_id): Path<Uuid>,
) -> impl IntoResponse {
    match state
        .favorite_service
        .toggle_favorite(auth_user.user_id, listing_id)
        .await
    {
        Ok(toggled) => (StatusCode::OK, Json(toggled)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/favorites/{listing_id}",
    tag = "Favorites",
    operation_id = "removeFavorite",
    params(("listing_id" = Uuid, Path, description = "Listing ID")),
    responses(
        (status = 204, description = "Favorite removed, or was never set"),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_favorite(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(listing_id): Path<Uuid>,
) -> impl IntoResponse {
    match state
        .favorite_service
        .remove_favorite(auth_user.user_id, listing_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/favorites",
    tag = "Favorites",
    operation_id = "getFavorites",
    responses(
        (status = 200, description = "Favorited listings", body = [SafeListing]),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_favorites(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    match state.favorite_service.get_favorites(auth_user.user_id).await {
        Ok(listings) => (StatusCode::OK, Json(listings)).into_response(),
        Err(e) => e.into_response(),
    }
}

// Listing management, search and review handlers

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use crate::{
    app::AppState,
    middleware::AuthenticatedUser,
    models::{
        CreateListingRequest, CreateReviewRequest, ListingDetail, ListingSearchQuery,
        PaginatedListings, SafeListing, SafeReview, UpdateListingRequest,
    },
};

#[utoipa::path(
    post,
    path = "/v1/listings",
    tag = "Listings",
    operation_id = "createListing",
    request_body = CreateListingRequest,
    responses(
        (status = 201, description = "Listing created", body = SafeListing),
        (status = 400, description = "Bad request - validation failed"),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_listing(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateListingRequest>,
) -> impl IntoResponse {
    match state
        .listing_service
        .create_listing(auth_user.user_id, request)
        .await
    {
        Ok(listing) => (StatusCode::CREATED, Json(listing)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/listings/{id}",
    tag = "Listings",
    operation_id = "getListing",
    params(("id" = Uuid, Path, description = "Listing ID")),
    responses(
        (status = 200, description = "Listing with owner, rating summary and booked ranges", body = ListingDetail),
        (status = 404, description = "Listing not found")
    )
)]
pub async fn get_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.listing_service.get_listing_detail(listing_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/listings/{id}",
    tag = "Listings",
    operation_id = "updateListing",
    params(("id" = Uuid, Path, description = "Listing ID")),
    request_body = UpdateListingRequest,
    responses(
        (status = 200, description = "Listing updated", body = SafeListing),
        (status = 400, description = "Bad request - validation failed"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - not the listing owner"),
        (status = 404, description = "Listing not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_listing(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(listing_id): Path<Uuid>,
    Json(request): Json<UpdateListingRequest>,
) -> impl IntoResponse {
    match state
        .listing_service
        .update_listing(auth_user.actor(), listing_id, request)
        .await
    {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/listings/{id}",
    tag = "Listings",
    operation_id = "deleteListing",
    params(("id" = Uuid, Path, description = "Listing ID")),
    responses(
        (status = 204, description = "Listing deleted with its bookings, reviews and favorites"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - not the owner or an admin"),
        (status = 404, description = "Listing not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_listing(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(listing_id): Path<Uuid>,
) -> impl IntoResponse {
    match state
        .listing_service
        .delete_listing(auth_user.actor(), listing_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/listings/mine",
    tag = "Listings",
    operation_id = "getMyListings",
    responses(
        (status = 200, description = "Caller's listings", body = [SafeListing]),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_my_listings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    match state
        .listing_service
        .get_user_listings(auth_user.user_id)
        .await
    {
        Ok(listings) => (StatusCode::OK, Json(listings)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Served at both `/v1/listings` and `/v1/search`
#[utoipa::path(
    get,
    path = "/v1/listings",
    tag = "Listings",
    operation_id = "searchListings",
    params(ListingSearchQuery),
    responses(
        (status = 200, description = "Matching listings, newest first", body = PaginatedListings),
        (status = 400, description = "Bad request - invalid filter combination")
    )
)]
pub async fn search_listings(
    State(state): State<AppState>,
    Query(query): Query<ListingSearchQuery>,
) -> impl IntoResponse {
    match state.search_service.search_listings(&query).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/listings/{id}/reviews",
    tag = "Reviews",
    operation_id = "getListingReviews",
    params(("id" = Uuid, Path, description = "Listing ID")),
    responses(
        (status = 200, description = "Reviews, newest first", body = [SafeReview]),
        (status = 404, description = "Listing not found")
    )
)]
pub async fn get_listing_reviews(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.review_service.get_listing_reviews(listing_id).await {
        Ok(reviews) => (StatusCode::OK, Json(reviews)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/listings/{id}/reviews",
    tag = "Reviews",
    operation_id = "createReview",
    params(("id" = Uuid, Path, description = "Listing ID")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review created", body = SafeReview),
        (status = 400, description = "Bad request - validation failed"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - no completed stay, or own listing"),
        (status = 404, description = "Listing not found"),
        (status = 409, description = "Conflict - already reviewed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_review(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(listing_id): Path<Uuid>,
    Json(request): Json<CreateReviewRequest>,
) -> impl IntoResponse {
    match state
        .review_service
        .create_review(auth_user.user_id, listing_id, request)
        .await
    {
        Ok(review) => (StatusCode::CREATED, Json(review)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/reviews/{id}",
    tag = "Reviews",
    operation_id = "deleteReview",
    params(("id" = Uuid, Path, description = "Review ID")),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - not the author or an admin"),
        (status = 404, description = "Review not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_review(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(review_id): Path<Uuid>,
) -> impl IntoResponse {
    match state
        .review_service
        .delete_review(auth_user.actor(), review_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

// User profile handlers

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use crate::{
    app::AppState,
    middleware::AuthenticatedUser,
    models::{ProfileUpdateResponse, SafeUser, UpdateProfileRequest, UserProfileResponse},
};

#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    operation_id = "getMe",
    responses(
        (status = 200, description = "Current user", body = SafeUser),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    match state.user_service.get_me(auth_user.user_id).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// A changed email is not applied immediately: a verification token is sent to
/// the new address and `pending_email` is returned.
#[utoipa::path(
    patch,
    path = "/v1/users/me",
    tag = "Users",
    operation_id = "updateMe",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileUpdateResponse),
        (status = 400, description = "Bad request - validation failed"),
        (status = 401, description = "Unauthorized - invalid token or wrong current password"),
        (status = 409, description = "Conflict - email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Json(request): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    match state
        .user_service
        .update_profile(auth_user.user_id, request)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    tag = "Users",
    operation_id = "getUserProfile",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Public profile with listings", body = UserProfileResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.listing_service.get_user_profile(user_id).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(e) => e.into_response(),
    }
}

// Admin dashboard handlers. Mounted behind `auth_middleware` and `require_admin`.

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
        AdminStats, AdminUserUpdate, PaginatedBookings, PaginatedUsers, PaginationParams, SafeUser,
    },
};

#[utoipa::path(
    get,
    path = "/v1/admin/stats",
    tag = "Admin",
    operation_id = "adminStats",
    responses(
        (status = 200, description = "Platform totals and revenue", body = AdminStats),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - admin role required")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.admin_service.get_stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/users",
    tag = "Admin",
    operation_id = "adminListUsers",
    params(PaginationParams),
    responses(
        (status = 200, description = "Users, newest first", body = PaginatedUsers),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - admin role required")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    match state.admin_service.list_users(&pagination).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/admin/users/{id}",
    tag = "Admin",
    operation_id = "adminUpdateUser",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = AdminUserUpdate,
    responses(
        (status = 200, description = "User updated", body = SafeUser),
        (status = 400, description = "Bad request - cannot demote or deactivate yourself"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - admin role required"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<AdminUserUpdate>,
) -> impl IntoResponse {
    match state
        .admin_service
        .update_user(auth_user.user_id, user_id, request)
        .await
    {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/admin/bookings",
    tag = "Admin",
    operation_id = "adminListBookings",
    params(PaginationParams),
    responses(
        (status = 200, description = "All bookings, newest first", body = PaginatedBookings),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - admin role required")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    match state.booking_service.list_all_bookings(&pagination).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => e.into_response(),
    }
}

// Booking handlers

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use crate::{
    app::AppState,
    middleware::AuthenticatedUser,
    models::{BookingWithListing, CreateBookingRequest, SafeBooking},
};

/// Creates a pending booking. Payment is collected separately through
/// `/v1/payments/intent`.
#[utoipa::path(
    post,
    path = "/v1/bookings",
    tag = "Bookings",
    operation_id = "createBooking",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created in pending state", body = SafeBooking),
        (status = 400, description = "Bad request - invalid dates, guest count, or own listing"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 404, description = "Listing not found"),
        (status = 409, description = "Conflict - dates overlap an existing booking")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateBookingRequest>,
) -> impl IntoResponse {
    match state
        .booking_service
        .create_booking(auth_user.user_id, request)
        .await
    {
        Ok(booking) => (StatusCode::CREATED, Json(booking)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/bookings",
    tag = "Bookings",
    operation_id = "getMyBookings",
    responses(
        (status = 200, description = "Caller's bookings with their listings", body = [BookingWithListing]),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_my_bookings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    match state
        .booking_service
        .get_user_bookings(auth_user.user_id)
        .await
    {
        Ok(bookings) => (StatusCode::OK, Json(bookings)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/bookings/hosting",
    tag = "Bookings",
    operation_id = "getHostingBookings",
    responses(
        (status = 200, description = "Bookings on the caller's listings", body = [BookingWithListing]),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_hosting_bookings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    match state
        .booking_service
        .get_hosting_bookings(auth_user.user_id)
        .await
    {
        Ok(bookings) => (StatusCode::OK, Json(bookings)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/bookings/{id}",
    tag = "Bookings",
    operation_id = "getBooking",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking", body = SafeBooking),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - not the guest or the host"),
        (status = 404, description = "Booking not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(booking_id): Path<Uuid>,
) -> impl IntoResponse {
    match state
        .booking_service
        .get_booking(auth_user.actor(), booking_id)
        .await
    {
        Ok(booking) => (StatusCode::OK, Json(booking)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/bookings/{id}",
    tag = "Bookings",
    operation_id = "cancelBooking",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking cancelled, completed payment refunded", body = SafeBooking),
        (status = 400, description = "Bad request - booking already cancelled"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - not the guest or the host"),
        (status = 404, description = "Booking not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Path(booking_id): Path<Uuid>,
) -> impl IntoResponse {
    match state
        .booking_service
        .cancel_booking(auth_user.actor(), booking_id)
        .await
    {
        Ok(booking) => (StatusCode::OK, Json(booking)).into_response(),
        Err(e) => e.into_response(),
    }
}

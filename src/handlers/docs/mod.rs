// API documentation: utoipa generated OpenAPI document and a Swagger UI page
pub mod swagger_ui;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        server::Server,
    },
    Modify, OpenApi,
};

use crate::app::AppState;
use crate::app_config::AppConfig;
use crate::handlers::{admin, auth, bookings, favorites, health, listings, payments, uploads, users};
use crate::models::{
    AdminStats, AdminUserUpdate, BookedRange, BookingCounts, BookingStatus, BookingWithListing,
    Category, CreateBookingRequest, CreateListingRequest, CreatePaymentIntentRequest,
    CreateReviewRequest, FavoriteToggleResponse, ListingDetail, ListingSearchQuery, LoginRequest,
    MessageResponse, NewPasswordRequest, NewVerificationRequest, PaginatedBookings,
    PaginatedListings, PaginatedUsers, PaginationParams, PaymentIntentResponse, PaymentStatus,
    ProfileUpdateResponse, PublicUser, RatingSummary, RefreshRequest, RegisterRequest,
    ResetRequest, Role, SafeBooking, SafeListing, SafePayment, SafeReview, SafeUser,
    SessionResponse, SessionUser, TokenPair, UpdateListingRequest, UpdateProfileRequest,
    UserProfileResponse,
};
use crate::services::upload::UploadResponse;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Activity Marketplace API",
        description = "Listings, bookings, payments and reviews for a peer-to-peer activity marketplace",
        version = "1.0.0"
    ),
    paths(
        auth::register,
        auth::login,
        auth::new_verification,
        auth::reset,
        auth::new_password,
        auth::refresh,
        auth::logout,
        auth::session,
        users::get_me,
        users::update_me,
        users::get_user_profile,
        listings::create_listing,
        listings::get_listing,
        listings::update_listing,
        listings::delete_listing,
        listings::get_my_listings,
        listings::search_listings,
        listings::get_listing_reviews,
        listings::create_review,
        listings::delete_review,
        bookings::create_booking,
        bookings::get_my_bookings,
        bookings::get_hosting_bookings,
        bookings::get_booking,
        bookings::cancel_booking,
        payments::create_payment_intent,
        payments::stripe_webhook,
        payments::get_my_payments,
        favorites::toggle_favorite,
        favorites::remove_favorite,
        favorites::get_favorites,
        uploads::upload_image,
        admin::get_stats,
        admin::list_users,
        admin::update_user,
        admin::list_bookings,
        health::health_check,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        NewVerificationRequest,
        ResetRequest,
        NewPasswordRequest,
        RefreshRequest,
        TokenPair,
        SessionUser,
        SessionResponse,
        MessageResponse,
        Role,
        SafeUser,
        PublicUser,
        UpdateProfileRequest,
        ProfileUpdateResponse,
        UserProfileResponse,
        Category,
        CreateListingRequest,
        UpdateListingRequest,
        ListingSearchQuery,
        SafeListing,
        RatingSummary,
        BookedRange,
        ListingDetail,
        BookingStatus,
        CreateBookingRequest,
        SafeBooking,
        BookingWithListing,
        PaymentStatus,
        CreatePaymentIntentRequest,
        PaymentIntentResponse,
        SafePayment,
        FavoriteToggleResponse,
        CreateReviewRequest,
        SafeReview,
        BookingCounts,
        AdminStats,
        AdminUserUpdate,
        UploadResponse,
        PaginationParams,
        PaginatedListings,
        PaginatedUsers,
        PaginatedBookings,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Registration, sign-in, email verification and password reset"),
        (name = "Users", description = "Profiles"),
        (name = "Listings", description = "Listing management and search"),
        (name = "Reviews", description = "Reviews of completed stays"),
        (name = "Bookings", description = "Reservations and cancellations"),
        (name = "Payments", description = "Stripe payment intents and webhooks"),
        (name = "Favorites", description = "Saved listings"),
        (name = "Uploads", description = "Image uploads"),
        (name = "Admin", description = "Admin dashboard"),
        (name = "Health", description = "Service health checks")
    )
)]
pub struct ApiDoc;

/// Generated document with the server list for the current environment
pub fn build_openapi_document(config: &AppConfig) -> utoipa::openapi::OpenApi {
    let mut document = ApiDoc::openapi();
    let mut server = Server::new(config.server.public_base_url.trim_end_matches('/'));
    server.description = Some(format!("Current server ({})", config.environment));
    document.servers = Some(vec![server]);
    document
}

/// Serve OpenAPI JSON at /v1/docs/openapi.json
pub async fn serve_openapi_document(State(app_state): State<AppState>) -> Response {
    let document = build_openapi_document(app_state.config.as_ref());

    match document.to_json() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to serialize OpenAPI document: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

pub use swagger_ui::serve_swagger_ui;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_covers_routes() {
        let json = ApiDoc::openapi().to_json().unwrap();
        for path in [
            "/v1/auth/login",
            "/v1/listings/{id}",
            "/v1/bookings/{id}",
            "/v1/payments/webhook",
            "/v1/admin/users/{id}",
            "/health",
        ] {
            assert!(json.contains(path), "missing {}", path);
        }
        assert!(json.contains("bearerAuth"));
    }
}

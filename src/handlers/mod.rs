pub mod admin;
pub mod auth;
pub mod bookings;
pub mod docs;
pub mod favorites;
pub mod health;
pub mod listings;
pub mod payments;
pub mod uploads;
pub mod users;

use crate::{
    app::AppState,
    middleware::{auth_middleware, require_admin},
    services::metrics,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};

// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

// Authentication routes
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::session))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/new-verification", post(auth::new_verification))
        .route("/reset", post(auth::reset))
        .route("/new-password", post(auth::new_password))
        .route("/refresh", post(auth::refresh))
        .merge(protected)
}

pub fn user_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(users::get_me).patch(users::update_me))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/{id}", get(users::get_user_profile))
        .merge(protected)
}

// Listings, plus the reviews nested under them
pub fn listing_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(listings::create_listing))
        .route("/mine", get(listings::get_my_listings))
        .route(
            "/{id}",
            axum::routing::put(listings::update_listing).delete(listings::delete_listing),
        )
        .route("/{id}/reviews", post(listings::create_review))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/", get(listings::search_listings))
        .route("/{id}", get(listings::get_listing))
        .route("/{id}/reviews", get(listings::get_listing_reviews))
        .merge(protected)
}

pub fn search_routes() -> Router<AppState> {
    Router::new().route("/", get(listings::search_listings))
}

pub fn booking_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(bookings::create_booking).get(bookings::get_my_bookings),
        )
        .route("/hosting", get(bookings::get_hosting_bookings))
        .route(
            "/{id}",
            get(bookings::get_booking).delete(bookings::cancel_booking),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

// The webhook authenticates by signature, not bearer token
pub fn payment_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/", get(payments::get_my_payments))
        .route("/intent", post(payments::create_payment_intent))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/webhook", post(payments::stripe_webhook))
        .merge(protected)
}

pub fn favorite_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(favorites::get_favorites))
        .route(
            "/{listing_id}",
            post(favorites::toggle_favorite).delete(favorites::remove_favorite),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

pub fn review_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/{id}", axum::routing::delete(listings::delete_review))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

pub fn upload_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(uploads::upload_image))
        .layer(DefaultBodyLimit::max(
            state.upload_service.max_bytes() + MULTIPART_OVERHEAD_BYTES,
        ))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

// Admin routes: auth_middleware runs first, then require_admin
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/stats", get(admin::get_stats))
        .route("/users", get(admin::list_users))
        .route("/users/{id}", patch(admin::update_user))
        .route("/bookings", get(admin::list_bookings))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

pub fn docs_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(docs::serve_swagger_ui))
        .route("/openapi.json", get(docs::serve_openapi_document))
}

/// Prometheus text exposition
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

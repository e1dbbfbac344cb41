// Application state and router assembly
use std::sync::Arc;

use axum::{middleware::from_fn, routing::get, Router};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    app_config::AppConfig,
    db::DieselPool,
    handlers,
    middleware::dynamic_cors_middleware,
    services::{
        metrics, AdminService, AuthService, BookingService, EmailError, EmailService,
        FavoriteService, JwtConfig, JwtService, ListingService, PasswordResetService,
        PaymentGateway, PaymentService, RateLimitService, ReviewService, SearchService,
        UploadService, UserService, VerificationService,
    },
    RedisPool,
};

// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub diesel_pool: DieselPool,
    pub redis_pool: RedisPool,
    pub jwt_service: Arc<JwtService>,
    pub rate_limit_service: Arc<RateLimitService>,
    pub email_service: Arc<EmailService>,
    pub auth_service: Arc<AuthService>,
    pub verification_service: Arc<VerificationService>,
    pub password_reset_service: Arc<PasswordResetService>,
    pub user_service: Arc<UserService>,
    pub listing_service: Arc<ListingService>,
    pub search_service: Arc<SearchService>,
    pub booking_service: Arc<BookingService>,
    pub payment_service: Arc<PaymentService>,
    pub favorite_service: Arc<FavoriteService>,
    pub review_service: Arc<ReviewService>,
    pub admin_service: Arc<AdminService>,
    pub upload_service: Arc<UploadService>,
    pub max_connections: u32,
}

impl AppState {
    /// Wire every service from pools and a payment gateway. Tests pass a fake
    /// gateway here instead of the Stripe client.
    pub fn new(
        config: &AppConfig,
        diesel_pool: DieselPool,
        redis_pool: RedisPool,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Result<Self, EmailError> {
        let email_service = Arc::new(EmailService::new(config.email.clone())?);
        let verification = VerificationService::new(diesel_pool.clone(), email_service.clone());

        let jwt_service = Arc::new(JwtService::new_with_full_integration(
            JwtConfig::from_env(),
            diesel_pool.clone(),
            redis_pool.clone(),
        ));

        let auth_service = Arc::new(AuthService::new(
            diesel_pool.clone(),
            jwt_service.clone(),
            verification.clone(),
            email_service.clone(),
        ));

        Ok(Self {
            config: Arc::new(config.clone()),
            rate_limit_service: Arc::new(RateLimitService::new(redis_pool.clone())),
            password_reset_service: Arc::new(PasswordResetService::new(
                diesel_pool.clone(),
                email_service.clone(),
            )),
            user_service: Arc::new(UserService::new(diesel_pool.clone(), verification.clone())),
            verification_service: Arc::new(verification),
            listing_service: Arc::new(ListingService::new(diesel_pool.clone())),
            search_service: Arc::new(SearchService::new(diesel_pool.clone())),
            booking_service: Arc::new(BookingService::new(diesel_pool.clone(), gateway.clone())),
            payment_service: Arc::new(PaymentService::new(
                diesel_pool.clone(),
                gateway,
                email_service.clone(),
                &config.stripe,
            )),
            favorite_service: Arc::new(FavoriteService::new(diesel_pool.clone())),
            review_service: Arc::new(ReviewService::new(diesel_pool.clone())),
            admin_service: Arc::new(AdminService::new(diesel_pool.clone())),
            upload_service: Arc::new(UploadService::new(
                &config.uploads,
                &config.server.public_base_url,
            )),
            max_connections: config.database.max_connections,
            auth_service,
            jwt_service,
            email_service,
            diesel_pool,
            redis_pool,
        })
    }
}

/// Full router: versioned API, health, uploaded files and optional docs and
/// metrics endpoints
pub fn create_app(state: AppState) -> Router {
    let features = state.config.features.clone();

    let api = Router::new()
        .nest("/auth", handlers::auth_routes(&state))
        .nest("/users", handlers::user_routes(&state))
        .nest("/listings", handlers::listing_routes(&state))
        .nest("/search", handlers::search_routes())
        .nest("/bookings", handlers::booking_routes(&state))
        .nest("/payments", handlers::payment_routes(&state))
        .nest("/favorites", handlers::favorite_routes(&state))
        .nest("/reviews", handlers::review_routes(&state))
        .nest("/uploads", handlers::upload_routes(&state))
        .nest("/admin", handlers::admin_routes(&state));

    let api = if features.enable_swagger_ui {
        api.nest("/docs", handlers::docs_routes())
    } else {
        api
    };

    let mut app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/v1", api)
        .nest_service("/uploads", ServeDir::new(&state.config.uploads.dir));

    if features.enable_metrics {
        app = app
            .route("/metrics", get(handlers::metrics_endpoint))
            .layer(from_fn(metrics::track_metrics));
    }

    app.layer(from_fn(dynamic_cors_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Business logic layer

pub mod admin;
pub mod auth;
pub mod booking;
pub mod email;
pub mod favorite;
pub mod jwt;
pub mod listing;
pub mod metrics;
pub mod password_reset;
pub mod payment;
pub mod rate_limit;
pub mod review;
pub mod search;
pub mod stripe;
pub mod upload;
pub mod user;
pub mod verification;

pub use admin::AdminService;
pub use auth::AuthService;
pub use booking::BookingService;
pub use email::{EmailError, EmailService};
pub use favorite::FavoriteService;
pub use jwt::{JwtConfig, JwtError, JwtService};
pub use listing::{Actor, ListingService};
pub use password_reset::PasswordResetService;
pub use payment::PaymentService;
pub use rate_limit::{RateLimitConfig, RateLimitError, RateLimitResult, RateLimitService};
pub use review::ReviewService;
pub use search::SearchService;
pub use stripe::{PaymentGateway, StripeClient, StripeError};
pub use upload::UploadService;
pub use user::UserService;
pub use verification::VerificationService;

pub mod admin;
pub mod auth;
pub mod booking;
pub mod favorite;
pub mod listing;
pub mod password_reset;
pub mod pagination;
pub mod payment;
pub mod refresh_token;
pub mod review;
pub mod two_factor;
pub mod user;
pub mod verification_token;

pub use admin::{AdminStats, AdminUserUpdate, BookingCounts};
pub use auth::*;
pub use booking::{
    calculate_total_price, Booking, BookingStatus, BookingWithListing, CreateBookingRequest,
    DateRange, NewBooking, SafeBooking,
};
pub use favorite::{Favorite, FavoriteToggleResponse, NewFavorite};
pub use listing::{
    BookedRange, Category, CreateListingRequest, Listing, ListingDetail, ListingSearchQuery,
    ListingUpdate, NewListing, RatingSummary, SafeListing, UpdateListingRequest,
    UserProfileResponse,
};
pub use pagination::{
    Paginated, PaginatedBookings, PaginatedListings, PaginatedUsers, PaginationParams, MAX_PER_PAGE,
};
pub use password_reset::*;
pub use payment::{
    CreatePaymentIntentRequest, NewPayment, Payment, PaymentIntentResponse, PaymentStatus,
    SafePayment,
};
pub use refresh_token::*;
pub use review::{CreateReviewRequest, NewReview, Review, SafeReview};
pub use two_factor::{TwoFactorConfirmation, TwoFactorToken, TWO_FACTOR_TOKEN_TTL_MINUTES};
pub use user::*;
pub use verification_token::{VerificationToken, VERIFICATION_TOKEN_TTL_MINUTES};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::user::Role;

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct BookingCounts {
    pub pending: i64,
    pub confirmed: i64,
    pub cancelled: i64,
}

/// Platform totals for the admin dashboard
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminStats {
    pub users: i64,
    pub listings: i64,
    pub bookings: BookingCounts,
    /// Sum of completed payments in minor units
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdminUserUpdate {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl AdminUserUpdate {
    /// Whether applying the update to one's own account would lock the admin out
    pub fn demotes_self(&self) -> bool {
        matches!(self.role, Some(Role::User)) || self.is_active == Some(false)
    }
}

// Admin dashboard: platform statistics and user management

use diesel::dsl::{count_star, sql};
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, RunQueryDsl};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DieselPool,
    models::{
        AdminStats, AdminUserUpdate, BookingCounts, Paginated, PaginationParams, PaymentStatus,
        RefreshToken, SafeUser, User, UserUpdate,
    },
    schema::{bookings, listings, payments, users},
    utils::{
        audit_logger::{AuditAction, AuditLogger},
        service_error::ServiceError,
    },
};

/// Fold `(status, count)` rows into per-status totals; unknown statuses are skipped
pub fn booking_counts(rows: &[(String, i64)]) -> BookingCounts {
    let mut counts = BookingCounts::default();
    for (status, count) in rows {
        match status.as_str() {
            "pending" => counts.pending += count,
            "confirmed" => counts.confirmed += count,
            "cancelled" => counts.cancelled += count,
            _ => {},
        }
    }
    counts
}

#[derive(Clone)]
pub struct AdminService {
    diesel_pool: DieselPool,
}

impl AdminService {
    pub fn new(diesel_pool: DieselPool) -> Self {
        Self { diesel_pool }
    }

    pub async fn get_stats(&self) -> Result<AdminStats, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let user_count: i64 = users::table.count().get_result(&mut conn).await?;
        let listing_count: i64 = listings::table.count().get_result(&mut conn).await?;

        let by_status: Vec<(String, i64)> = bookings::table
            .group_by(bookings::status)
            .select((bookings::status, count_star()))
            .load(&mut conn)
            .await?;

        let revenue_cents: i64 = payments::table
            .filter(payments::status.eq(PaymentStatus::Completed.as_str()))
            .select(sql::<BigInt>("COALESCE(SUM(amount_cents), 0)::BIGINT"))
            .first(&mut conn)
            .await?;

        Ok(AdminStats {
            users: user_count,
            listings: listing_count,
            bookings: booking_counts(&by_status),
            revenue_cents,
        })
    }

    pub async fn list_users(
        &self,
        pagination: &PaginationParams,
    ) -> Result<Paginated<SafeUser>, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let total: i64 = users::table.count().get_result(&mut conn).await?;

        let rows: Vec<User> = users::table
            .order((users::created_at.desc(), users::id.desc()))
            .limit(pagination.limit())
            .offset(pagination.offset())
            .select(User::as_select())
            .load(&mut conn)
            .await?;

        Ok(Paginated::new(
            rows.into_iter().map(SafeUser::from).collect(),
            total,
            pagination,
        ))
    }

    /// Change a user's role or active flag. Deactivation ends the user's sessions.
    #[instrument(skip(self, request))]
    pub async fn update_user(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        request: AdminUserUpdate,
    ) -> Result<SafeUser, ServiceError> {
        if admin_id == user_id && request.demotes_self() {
            return Err(ServiceError::ValidationError(
                "You cannot demote or deactivate your own account".to_string(),
            ));
        }

        let mut conn = self.diesel_pool.get().await?;

        if User::find_by_id(&mut conn, user_id).await?.is_none() {
            return Err(ServiceError::not_found("User"));
        }

        let deactivated = request.is_active == Some(false);
        let update = UserUpdate {
            role: request.role.map(|r| r.as_str().to_string()),
            is_active: request.is_active,
            ..Default::default()
        };

        let user = conn
            .transaction::<_, ServiceError, _>(|tx| {
                async move {
                    let user = User::update(tx, user_id, update).await?;
                    if deactivated {
                        RefreshToken::revoke_all_for_user(tx, user_id, "deactivated")
                            .await
                            .map_err(|e| ServiceError::DatabaseError(e.to_string()))?;
                    }
                    Ok(user)
                }
                .scope_boxed()
            })
            .await?;

        AuditLogger::log(
            AuditAction::UserUpdatedByAdmin,
            Some(admin_id),
            user_id,
            Some(format!("role={} active={}", user.role, user.is_active)),
        );
        info!(%admin_id, %user_id, "User updated by admin");

        Ok(user.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_counts() {
        let rows = vec![
            ("pending".to_string(), 3),
            ("confirmed".to_string(), 5),
            ("cancelled".to_string(), 1),
            ("archived".to_string(), 9),
        ];
        let counts = booking_counts(&rows);

        assert_eq!(counts.pending, 3);
        assert_eq!(counts.confirmed, 5);
        assert_eq!(counts.cancelled, 1);
    }
}

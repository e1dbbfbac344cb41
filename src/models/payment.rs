use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::schema::payments;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    /// Stripe PaymentIntent id
    pub provider_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct NewPayment {
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub provider_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl Payment {
    pub async fn find_by_user_id(
        conn: &mut AsyncPgConnection,
        user: Uuid,
    ) -> QueryResult<Vec<Self>> {
        payments::table
            .filter(payments::user_id.eq(user))
            .order(payments::created_at.desc())
            .select(Payment::as_select())
            .load(conn)
            .await
    }

    /// Lock the payment row for the rest of the transaction
    pub async fn lock_by_provider_id(
        conn: &mut AsyncPgConnection,
        provider_id: &str,
    ) -> QueryResult<Option<Self>> {
        payments::table
            .filter(payments::provider_payment_id.eq(provider_id))
            .select(Payment::as_select())
            .for_update()
            .first(conn)
            .await
            .optional()
    }

    pub async fn find_for_booking(
        conn: &mut AsyncPgConnection,
        booking: Uuid,
        status: PaymentStatus,
    ) -> QueryResult<Option<Self>> {
        payments::table
            .filter(payments::booking_id.eq(booking))
            .filter(payments::status.eq(status.as_str()))
            .order(payments::created_at.desc())
            .select(Payment::as_select())
            .first(conn)
            .await
            .optional()
    }

    /// Update status, stamping `completed_at` on completion
    pub async fn update_status(
        conn: &mut AsyncPgConnection,
        payment_id: Uuid,
        new_status: PaymentStatus,
        failure_reason: Option<String>,
    ) -> QueryResult<Self> {
        let now = Utc::now();
        let completed_at = match new_status {
            PaymentStatus::Completed => Some(now),
            _ => None,
        };

        diesel::update(payments::table.find(payment_id))
            .set((
                payments::status.eq(new_status.as_str()),
                payments::updated_at.eq(now),
                payments::failure_reason.eq(failure_reason),
                completed_at.map(|at| payments::completed_at.eq(Some(at))),
            ))
            .returning(Payment::as_returning())
            .get_result(conn)
            .await
    }

    pub fn status_enum(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_string(&self.status)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePaymentIntentRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SafePayment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl From<Payment> for SafePayment {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            booking_id: payment.booking_id,
            amount_cents: payment.amount_cents,
            currency: payment.currency,
            status: payment.status,
            failure_reason: payment.failure_reason,
            created_at: payment.created_at.to_rfc3339(),
            updated_at: payment.updated_at.to_rfc3339(),
            completed_at: payment.completed_at.map(|d| d.to_rfc3339()),
        }
    }
}

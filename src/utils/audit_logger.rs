// Audit trail for marketplace writes, emitted as JSON on the `audit` tracing target
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditAction {
    ListingCreated,
    ListingUpdated,
    ListingDeleted,
    BookingCreated,
    BookingCancelled,
    BookingConfirmed,
    PaymentCreated,
    PaymentCompleted,
    PaymentFailed,
    PaymentRefunded,
    ReviewCreated,
    ReviewDeleted,
    UserUpdatedByAdmin,
}

impl AuditAction {
    pub fn resource_type(&self) -> &'static str {
        match self {
            AuditAction::ListingCreated
            | AuditAction::ListingUpdated
            | AuditAction::ListingDeleted => "listing",
            AuditAction::BookingCreated
            | AuditAction::BookingCancelled
            | AuditAction::BookingConfirmed => "booking",
            AuditAction::PaymentCreated
            | AuditAction::PaymentCompleted
            | AuditAction::PaymentFailed
            | AuditAction::PaymentRefunded => "payment",
            AuditAction::ReviewCreated | AuditAction::ReviewDeleted => "review",
            AuditAction::UserUpdatedByAdmin => "user",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub action: AuditAction,
    /// None for events driven by the payment provider
    pub actor_id: Option<Uuid>,
    pub resource_id: Uuid,
    pub resource_type: String,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub struct AuditLogger;

impl AuditLogger {
    pub fn log(
        action: AuditAction,
        actor_id: Option<Uuid>,
        resource_id: Uuid,
        details: Option<String>,
    ) {
        let audit_log = AuditLog {
            id: Uuid::new_v4(),
            action,
            actor_id,
            resource_id,
            resource_type: action.resource_type().to_string(),
            details,
            timestamp: Utc::now(),
        };

        let json_log = serde_json::to_string(&audit_log).unwrap_or_else(|e| {
            warn!("Failed to serialize audit log: {}", e);
            format!("{:?}", audit_log)
        });

        info!(target: "audit", "{}", json_log);
    }
}

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::schema::password_reset_tokens;
use crate::utils::tokens::{hash_token, is_expired};

pub const PASSWORD_RESET_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = password_reset_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = password_reset_tokens)]
pub struct NewPasswordResetToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl NewPasswordResetToken {
    pub fn new(user_id: Uuid, raw_token: &str) -> Self {
        Self {
            user_id,
            token_hash: hash_token(raw_token),
            expires_at: Utc::now() + Duration::minutes(PASSWORD_RESET_TTL_MINUTES),
        }
    }
}

impl PasswordResetToken {
    pub async fn find_by_token(
        conn: &mut AsyncPgConnection,
        raw_token: &str,
    ) -> QueryResult<Option<Self>> {
        password_reset_tokens::table
            .filter(password_reset_tokens::token_hash.eq(hash_token(raw_token)))
            .select(PasswordResetToken::as_select())
            .first(conn)
            .await
            .optional()
    }

    pub fn is_usable(&self) -> bool {
        self.used_at.is_none() && !is_expired(self.expires_at)
    }
}

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::schema::verification_tokens;
use crate::utils::tokens::{hash_token, is_expired};

pub const VERIFICATION_TOKEN_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = verification_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VerificationToken {
    pub id: Uuid,
    pub email: String,
    /// Owner of a pending email change; `None` for sign-up confirmation
    pub user_id: Option<Uuid>,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = verification_tokens)]
pub struct NewVerificationToken {
    pub email: String,
    pub user_id: Option<Uuid>,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl VerificationToken {
    /// Store a token for the email, replacing any earlier one
    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        email: &str,
        user_id: Option<Uuid>,
        raw_token: &str,
    ) -> QueryResult<Self> {
        let new_token = NewVerificationToken {
            email: email.to_string(),
            user_id,
            token_hash: hash_token(raw_token),
            expires_at: Utc::now() + Duration::minutes(VERIFICATION_TOKEN_TTL_MINUTES),
        };

        diesel::insert_into(verification_tokens::table)
            .values(&new_token)
            .on_conflict(verification_tokens::email)
            .do_update()
            .set((
                verification_tokens::user_id.eq(excluded(verification_tokens::user_id)),
                verification_tokens::token_hash.eq(excluded(verification_tokens::token_hash)),
                verification_tokens::expires_at.eq(excluded(verification_tokens::expires_at)),
                verification_tokens::created_at.eq(Utc::now()),
            ))
            .returning(VerificationToken::as_returning())
            .get_result(conn)
            .await
    }

    pub async fn find_by_token(
        conn: &mut AsyncPgConnection,
        raw_token: &str,
    ) -> QueryResult<Option<Self>> {
        verification_tokens::table
            .filter(verification_tokens::token_hash.eq(hash_token(raw_token)))
            .select(VerificationToken::as_select())
            .first(conn)
            .await
            .optional()
    }

    pub async fn delete(conn: &mut AsyncPgConnection, token_id: Uuid) -> QueryResult<usize> {
        diesel::delete(verification_tokens::table.find(token_id))
            .execute(conn)
            .await
    }

    pub fn is_expired(&self) -> bool {
        is_expired(self.expires_at)
    }
}

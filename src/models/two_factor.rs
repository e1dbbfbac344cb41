use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::schema::{two_factor_confirmations, two_factor_tokens};
use crate::utils::tokens::{constant_time_eq, hash_token, is_expired};

pub const TWO_FACTOR_TOKEN_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = two_factor_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TwoFactorToken {
    pub id: Uuid,
    pub email: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = two_factor_tokens)]
pub struct NewTwoFactorToken {
    pub email: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl TwoFactorToken {
    /// One live code per email; issuing a new one replaces the old
    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        email: &str,
        code: &str,
    ) -> QueryResult<Self> {
        let new_token = NewTwoFactorToken {
            email: email.to_string(),
            token_hash: hash_token(code),
            expires_at: Utc::now() + Duration::minutes(TWO_FACTOR_TOKEN_TTL_MINUTES),
        };

        diesel::insert_into(two_factor_tokens::table)
            .values(&new_token)
            .on_conflict(two_factor_tokens::email)
            .do_update()
            .set((
                two_factor_tokens::token_hash.eq(excluded(two_factor_tokens::token_hash)),
                two_factor_tokens::expires_at.eq(excluded(two_factor_tokens::expires_at)),
                two_factor_tokens::created_at.eq(Utc::now()),
            ))
            .returning(TwoFactorToken::as_returning())
            .get_result(conn)
            .await
    }

    pub async fn find_by_email(
        conn: &mut AsyncPgConnection,
        email: &str,
    ) -> QueryResult<Option<Self>> {
        two_factor_tokens::table
            .filter(two_factor_tokens::email.eq(email))
            .select(TwoFactorToken::as_select())
            .first(conn)
            .await
            .optional()
    }

    pub async fn delete(conn: &mut AsyncPgConnection, token_id: Uuid) -> QueryResult<usize> {
        diesel::delete(two_factor_tokens::table.find(token_id))
            .execute(conn)
            .await
    }

    pub fn matches(&self, code: &str) -> bool {
        constant_time_eq(&self.token_hash, &hash_token(code.trim()))
    }

    pub fn is_expired(&self) -> bool {
        is_expired(self.expires_at)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = two_factor_confirmations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TwoFactorConfirmation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TwoFactorConfirmation {
    /// Record a confirmed code, replacing any previous confirmation
    pub async fn replace(conn: &mut AsyncPgConnection, user: Uuid) -> QueryResult<Self> {
        diesel::delete(
            two_factor_confirmations::table.filter(two_factor_confirmations::user_id.eq(user)),
        )
        .execute(conn)
        .await?;

        diesel::insert_into(two_factor_confirmations::table)
            .values(two_factor_confirmations::user_id.eq(user))
            .returning(TwoFactorConfirmation::as_returning())
            .get_result(conn)
            .await
    }

    /// Delete the user's confirmation, returning whether one existed
    pub async fn consume(conn: &mut AsyncPgConnection, user: Uuid) -> QueryResult<bool> {
        let deleted = diesel::delete(
            two_factor_confirmations::table.filter(two_factor_confirmations::user_id.eq(user)),
        )
        .execute(conn)
        .await?;

        Ok(deleted > 0)
    }
}

// Refresh tokens are tracked by a salted hash of their JTI. Rotation keeps the
// token family so reuse of a rotated token can revoke every sibling.
//
// Changing JTI_HASH_SALT invalidates all stored refresh tokens.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::schema::refresh_tokens;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = refresh_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub jti_hash: String,
    pub token_family: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub jti_hash: String,
    pub token_family: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug)]
pub enum RefreshTokenError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Token not found")]
    NotFound,

    #[error("Token expired")]
    Expired,

    /// Carries the family and reason so the caller can detect reuse
    #[error("Token revoked")]
    Revoked {
        token_family: String,
        reason: Option<String>,
    },
}

impl RefreshToken {
    pub fn hash_jti(jti: &str) -> String {
        let salt = &crate::app_config::config().security.jti_hash_salt;
        Self::hash_jti_with_salt(jti, salt.as_bytes())
    }

    pub fn hash_jti_with_salt(jti: &str, salt: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(jti.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn store(
        conn: &mut AsyncPgConnection,
        user: Uuid,
        jti: &str,
        expires_at: DateTime<Utc>,
        token_family: String,
    ) -> Result<Self, RefreshTokenError> {
        let new_token = NewRefreshToken {
            user_id: user,
            jti_hash: Self::hash_jti(jti),
            token_family,
            expires_at,
        };

        Ok(diesel::insert_into(refresh_tokens::table)
            .values(&new_token)
            .returning(RefreshToken::as_returning())
            .get_result(conn)
            .await?)
    }

    /// Load the token row with `FOR UPDATE` so concurrent rotations serialize
    pub async fn validate_and_lock(
        conn: &mut AsyncPgConnection,
        jti: &str,
    ) -> Result<Self, RefreshTokenError> {
        let token = refresh_tokens::table
            .filter(refresh_tokens::jti_hash.eq(Self::hash_jti(jti)))
            .select(RefreshToken::as_select())
            .for_update()
            .first(conn)
            .await
            .optional()?
            .ok_or(RefreshTokenError::NotFound)?;

        if token.revoked_at.is_some() {
            return Err(RefreshTokenError::Revoked {
                token_family: token.token_family,
                reason: token.revoked_reason,
            });
        }

        if token.expires_at <= Utc::now() {
            return Err(RefreshTokenError::Expired);
        }

        Ok(token)
    }

    pub async fn revoke(
        conn: &mut AsyncPgConnection,
        jti: &str,
        reason: &str,
    ) -> Result<bool, RefreshTokenError> {
        let updated = diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::jti_hash.eq(Self::hash_jti(jti)))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set((
            refresh_tokens::revoked_at.eq(Some(Utc::now())),
            refresh_tokens::revoked_reason.eq(Some(reason)),
        ))
        .execute(conn)
        .await?;

        Ok(updated > 0)
    }

    pub async fn revoke_token_family(
        conn: &mut AsyncPgConnection,
        family: &str,
        reason: &str,
    ) -> Result<usize, RefreshTokenError> {
        Ok(diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::token_family.eq(family))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set((
            refresh_tokens::revoked_at.eq(Some(Utc::now())),
            refresh_tokens::revoked_reason.eq(Some(reason)),
        ))
        .execute(conn)
        .await?)
    }

    pub async fn revoke_all_for_user(
        conn: &mut AsyncPgConnection,
        user: Uuid,
        reason: &str,
    ) -> Result<usize, RefreshTokenError> {
        Ok(diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::user_id.eq(user))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set((
            refresh_tokens::revoked_at.eq(Some(Utc::now())),
            refresh_tokens::revoked_reason.eq(Some(reason)),
        ))
        .execute(conn)
        .await?)
    }

    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none() && self.expires_at > Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_jti_depends_on_salt() {
        let a = RefreshToken::hash_jti_with_salt("jti-1", b"salt-one-salt-one-salt-one-salt-1");
        let b = RefreshToken::hash_jti_with_salt("jti-1", b"salt-two-salt-two-salt-two-salt-2");

        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(
            a,
            RefreshToken::hash_jti_with_salt("jti-1", b"salt-one-salt-one-salt-one-salt-1")
        );
    }
}

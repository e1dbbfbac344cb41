use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::schema::users;
use crate::utils::validation::validate_password_strength;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub password_hash: String,
    pub image: Option<String>,
    pub role: String,
    pub is_two_factor_enabled: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified_at: Option<Option<DateTime<Utc>>>,
    pub password_hash: Option<String>,
    pub image: Option<Option<String>>,
    pub role: Option<String>,
    pub is_two_factor_enabled: Option<bool>,
    pub is_active: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> QueryResult<Option<Self>> {
        users::table
            .find(user_id)
            .select(User::as_select())
            .first(conn)
            .await
            .optional()
    }

    /// Emails are stored lowercased, callers pass a normalized address
    pub async fn find_by_email(
        conn: &mut AsyncPgConnection,
        email: &str,
    ) -> QueryResult<Option<Self>> {
        users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(conn)
            .await
            .optional()
    }

    pub async fn update(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        mut update: UserUpdate,
    ) -> QueryResult<Self> {
        update.updated_at = Some(Utc::now());
        diesel::update(users::table.find(user_id))
            .set(&update)
            .returning(User::as_returning())
            .get_result(conn)
            .await
    }

    /// Unknown role strings fall back to the least privileged role
    pub fn role_enum(&self) -> Role {
        Role::from_str(&self.role).unwrap_or_else(|e| {
            tracing::warn!("{} for user {}, treating as user", e, self.id);
            Role::User
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role_enum() == Role::Admin
    }

    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

/// User as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SafeUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified_at: Option<String>,
    pub image: Option<String>,
    pub role: Role,
    pub is_two_factor_enabled: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for SafeUser {
    fn from(user: User) -> Self {
        let role = user.role_enum();
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            email_verified_at: user.email_verified_at.map(|d| d.to_rfc3339()),
            image: user.image,
            role,
            is_two_factor_enabled: user.is_two_factor_enabled,
            is_active: user.is_active,
            created_at: user.created_at.to_rfc3339(),
            updated_at: user.updated_at.to_rfc3339(),
        }
    }
}

/// Fields other users may see
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub created_at: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            image: user.image.clone(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    #[validate(url(message = "Image must be a valid URL"))]
    pub image: Option<String>,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: Option<String>,
    /// Current password, required when setting `new_password`
    pub password: Option<String>,
    #[validate(custom = "validate_password_strength")]
    pub new_password: Option<String>,
    pub is_two_factor_enabled: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileUpdateResponse {
    pub user: SafeUser,
    /// Set when an email change is waiting for verification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Rosa Diaz".into(),
            email: "rosa@example.com".into(),
            email_verified_at: Some(now),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
            image: None,
            role: "user".into(),
            is_two_factor_enabled: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_conversion() {
        assert_eq!(Role::from_str("admin"), Ok(Role::Admin));
        assert_eq!(Role::User.as_str(), "user");
        assert!(Role::from_str("root").is_err());
    }

    #[test]
    fn test_unknown_role_falls_back_to_user() {
        let mut user = sample_user();
        user.role = "superuser".into();
        assert_eq!(user.role_enum(), Role::User);
        assert!(!user.is_admin());
    }

    #[test]
    fn test_safe_user_has_no_password_hash() {
        let user = sample_user();
        let created = user.created_at.to_rfc3339();
        let json = serde_json::to_value(SafeUser::from(user)).unwrap();

        assert!(json.get("password_hash").is_none());
        assert_eq!(json["created_at"], created);
        assert_eq!(json["role"], "user");
    }
}

// Authenticated caller, built from validated access token claims

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    models::{AccessTokenClaims, Role},
    services::listing::Actor,
    utils::auth_errors::AuthError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub claims: AccessTokenClaims,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: AccessTokenClaims) -> Result<Self, AuthError> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        // unknown roles get no admin rights
        let role = Role::from_str(&claims.role).unwrap_or(Role::User);

        Ok(Self {
            user_id,
            email: claims.email.clone(),
            name: claims.name.clone(),
            role,
            claims,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.user_id,
            is_admin: self.is_admin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, role: &str) -> AccessTokenClaims {
        AccessTokenClaims {
            sub: sub.to_string(),
            jti: "jti-1".into(),
            email: "host@example.com".into(),
            name: "Host".into(),
            role: role.to_string(),
            two_factor_enabled: false,
            aud: "marketplace".into(),
            iss: "marketplace".into(),
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn test_admin_claims() {
        let id = Uuid::new_v4();
        let user = AuthenticatedUser::from_claims(claims(&id.to_string(), "admin")).unwrap();
        assert_eq!(user.user_id, id);
        assert!(user.is_admin());
        assert!(user.actor().is_admin);
    }

    #[test]
    fn test_unknown_role_is_not_admin() {
        let user =
            AuthenticatedUser::from_claims(claims(&Uuid::new_v4().to_string(), "root")).unwrap();
        assert!(!user.is_admin());
    }

    #[test]
    fn test_bad_subject_is_rejected() {
        assert!(AuthenticatedUser::from_claims(claims("not-a-uuid", "user")).is_err());
    }
}

use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DieselPool,
    models::{ProfileUpdateResponse, SafeUser, UpdateProfileRequest, User, UserUpdate},
    services::verification::VerificationService,
    utils::{
        hash_password, normalize_email, service_error::ServiceError, trim_optional_field,
        verify_password,
    },
};

#[derive(Clone)]
pub struct UserService {
    diesel_pool: DieselPool,
    verification: VerificationService,
}

impl UserService {
    pub fn new(diesel_pool: DieselPool, verification: VerificationService) -> Self {
        Self {
            diesel_pool,
            verification,
        }
    }

    pub async fn get_me(&self, user_id: Uuid) -> Result<SafeUser, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;
        let user = User::find_by_id(&mut conn, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;
        Ok(user.into())
    }

    /// Settings update.
    ///
    /// A new email is only stored once the link sent to it is confirmed;
    /// until then the response reports it as `pending_email`. Changing the
    /// password needs the current one.
    #[instrument(skip(self, request))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<ProfileUpdateResponse, ServiceError> {
        request.validate()?;

        let mut conn = self.diesel_pool.get().await?;

        let user = User::find_by_id(&mut conn, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))?;

        let mut update = UserUpdate::default();

        if let Some(new_password) = request.new_password.as_deref() {
            let current = request.password.as_deref().unwrap_or_default();
            if current.is_empty() || !verify_password(current, &user.password_hash)? {
                warn!(%user_id, "Password change with wrong current password");
                return Err(ServiceError::Unauthorized);
            }
            update.password_hash = Some(hash_password(new_password)?);
        }

        let mut pending_email = None;
        if let Some(email) = request.email.as_deref().map(normalize_email) {
            if email != user.email {
                if User::find_by_email(&mut conn, &email).await?.is_some() {
                    return Err(ServiceError::Conflict("Email already in use".to_string()));
                }
                self.verification
                    .send_verification(&mut conn, &email, &user.name, Some(user.id))
                    .await?;
                pending_email = Some(email);
            }
        }

        update.name = trim_optional_field(request.name.as_ref());
        if let Some(image) = trim_optional_field(request.image.as_ref()) {
            update.image = Some(Some(image));
        }
        update.is_two_factor_enabled = request.is_two_factor_enabled;

        let user = User::update(&mut conn, user.id, update).await?;

        info!(%user_id, email_change = pending_email.is_some(), "Profile updated");

        Ok(ProfileUpdateResponse {
            user: user.into(),
            pending_email,
        })
    }
}

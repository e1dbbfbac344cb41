// Bearer token authentication for protected routes.
// Validated callers are stored in request extensions as `AuthenticatedUser`.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    app::AppState, middleware::auth::AuthenticatedUser, utils::auth_errors::AuthError,
    utils::service_error::ServiceError,
};

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn auth_middleware(
    State(app_state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return AuthError::InvalidToken.into_response();
    };

    let claims = match app_state.jwt_service.validate_access_token(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!("Access token rejected: {}", e);
            return AuthError::InvalidToken.into_response();
        },
    };

    match app_state.jwt_service.is_token_blacklisted(&claims.jti).await {
        Ok(false) => {},
        Ok(true) => {
            tracing::warn!(user_id = %claims.sub, "Revoked access token presented");
            return AuthError::InvalidToken.into_response();
        },
        Err(e) => {
            tracing::error!("Token revocation check failed: {}", e);
            return AuthError::InternalError.into_response();
        },
    }

    match AuthenticatedUser::from_claims(claims) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        },
        Err(e) => e.into_response(),
    }
}

/// Layered after `auth_middleware` on admin routes
pub async fn require_admin(request: Request<Body>, next: Next) -> Response {
    match request.extensions().get::<AuthenticatedUser>() {
        Some(user) if user.is_admin() => next.run(request).await,
        Some(user) => {
            tracing::warn!(user_id = %user.user_id, "Non-admin refused on admin route");
            ServiceError::Forbidden("Admin access required".to_string()).into_response()
        },
        None => AuthError::InvalidToken.into_response(),
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}

// Authentication handlers: registration, sign-in, email verification,
// password reset and session management

use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;
use time::Duration;
use validator::Validate;

use crate::{
    app::AppState,
    middleware::{AuthenticatedUser, ClientIp},
    models::{
        LoginOutcome, LoginRequest, MessageResponse, NewPasswordRequest, NewVerificationRequest,
        RefreshRequest, RegisterRequest, ResetRequest, SafeUser, SessionResponse, SessionUser,
    },
    services::rate_limit::RateLimitConfig,
    utils::auth_errors::{log_auth_failure, AuthError},
};

pub const REFRESH_COOKIE: &str = "refresh_token";

fn refresh_cookie(token: String, max_age_seconds: u64) -> Cookie<'static> {
    let config = crate::app_config::config();
    Cookie::build((REFRESH_COOKIE, token))
        .path("/v1/auth")
        .http_only(true)
        .secure(config.security.secure_cookies)
        .same_site(SameSite::Strict)
        .max_age(Duration::seconds(max_age_seconds as i64))
        .build()
}

fn expired_refresh_cookie() -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, ""))
        .path("/v1/auth")
        .http_only(true)
        .max_age(Duration::seconds(0))
        .build()
}

/// Cookie first (browsers), then the JSON body (other clients)
fn extract_refresh_token(jar: &CookieJar, body: &Bytes) -> Option<String> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    if body.is_empty() {
        return None;
    }
    serde_json::from_slice::<RefreshRequest>(body)
        .ok()
        .and_then(|req| req.refresh_token)
        .filter(|t| !t.is_empty())
}

async fn enforce_rate_limit(
    state: &AppState,
    key: String,
    config: &RateLimitConfig,
) -> Result<(), AuthError> {
    let result = state.rate_limit_service.check(&key, config).await;
    if result.allowed {
        return Ok(());
    }
    Err(AuthError::RateLimited {
        retry_after_seconds: result.retry_after.unwrap_or(config.window_seconds) as u64,
    })
}

fn session_response(state: &AppState, jar: CookieJar, session: SessionResponse) -> Response {
    let jar = jar.add(refresh_cookie(
        session.tokens.refresh_token.clone(),
        state.jwt_service.refresh_token_expiry(),
    ));
    (StatusCode::OK, jar, Json(session)).into_response()
}

/// POST /v1/auth/register
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, confirmation email sent", body = SafeUser),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already in use"),
        (status = 429, description = "Too many registrations from this address")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(request): Json<RegisterRequest>,
) -> Response {
    if let Err(e) =
        enforce_rate_limit(&state, format!("register:ip:{}", ip), &RateLimitConfig::register()).await
    {
        log_auth_failure(&request.email, &ip, &e);
        return e.into_response();
    }

    match state.auth_service.register(request).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /v1/auth/login
///
/// Three successful shapes: a session with tokens, `{"two_factor": true}`
/// when a code was emailed, or `{"success": "Confirmation email sent"}` for
/// unverified accounts.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in, two-factor code sent, or confirmation sent", body = SessionResponse),
        (status = 400, description = "Invalid or expired two-factor code"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account inactive"),
        (status = 429, description = "Too many login attempts")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Response {
    let rate_key = format!("login:ip:{}", ip);
    if let Err(e) = enforce_rate_limit(&state, rate_key.clone(), &RateLimitConfig::login()).await {
        log_auth_failure(&request.email, &ip, &e);
        return e.into_response();
    }

    match state.auth_service.login(request, &ip).await {
        Ok(LoginOutcome::SignedIn(session)) => {
            // failed attempts before a successful sign-in no longer count
            if let Err(e) = state.rate_limit_service.clear(&rate_key).await {
                tracing::warn!("Failed to reset login rate limit for {}: {}", ip, e);
            }
            session_response(&state, jar, session)
        },
        Ok(LoginOutcome::TwoFactorRequired) => {
            (StatusCode::OK, Json(json!({ "two_factor": true }))).into_response()
        },
        Ok(LoginOutcome::ConfirmationSent) => (
            StatusCode::OK,
            Json(MessageResponse::new("Confirmation email sent")),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /v1/auth/new-verification
#[utoipa::path(
    post,
    path = "/v1/auth/new-verification",
    tag = "Auth",
    request_body = NewVerificationRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Token missing, expired, or email no longer exists")
    )
)]
pub async fn new_verification(
    State(state): State<AppState>,
    Json(request): Json<NewVerificationRequest>,
) -> Response {
    match state.verification_service.confirm(&request.token).await {
        Ok(_) => (StatusCode::OK, Json(MessageResponse::new("Email verified"))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /v1/auth/reset
#[utoipa::path(
    post,
    path = "/v1/auth/reset",
    tag = "Auth",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Reset email sent if the account exists", body = MessageResponse),
        (status = 400, description = "Invalid email"),
        (status = 429, description = "Too many reset requests")
    )
)]
pub async fn reset(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(request): Json<ResetRequest>,
) -> Response {
    if let Err(e) = request.validate() {
        return AuthError::from(e).into_response();
    }

    if let Err(e) = enforce_rate_limit(
        &state,
        format!("reset:ip:{}", ip),
        &RateLimitConfig::password_reset(),
    )
    .await
    {
        return e.into_response();
    }

    match state.password_reset_service.request_reset(&request.email).await {
        Ok(()) => (StatusCode::OK, Json(MessageResponse::new("Reset email sent"))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /v1/auth/new-password
#[utoipa::path(
    post,
    path = "/v1/auth/new-password",
    tag = "Auth",
    request_body = NewPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid password, or unknown, used or expired token")
    )
)]
pub async fn new_password(
    State(state): State<AppState>,
    Json(request): Json<NewPasswordRequest>,
) -> Response {
    if let Err(e) = request.validate() {
        return AuthError::from(e).into_response();
    }

    match state
        .password_reset_service
        .reset_password(&request.token, &request.password)
        .await
    {
        Ok(_) => (StatusCode::OK, Json(MessageResponse::new("Password updated"))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /v1/auth/refresh
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = SessionResponse),
        (status = 401, description = "Invalid, expired or reused refresh token")
    )
)]
pub async fn refresh(State(state): State<AppState>, jar: CookieJar, body: Bytes) -> Response {
    let Some(token) = extract_refresh_token(&jar, &body) else {
        return AuthError::InvalidToken.into_response();
    };

    match state.auth_service.refresh(&token).await {
        Ok(session) => session_response(&state, jar, session),
        Err(e) => {
            // a rejected cookie is useless to keep
            (jar.add(expired_refresh_cookie()), e).into_response()
        },
    }
}

/// POST /v1/auth/logout
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    let refresh_token = extract_refresh_token(&jar, &body);

    match state
        .auth_service
        .logout(&auth_user.claims, refresh_token.as_deref())
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            jar.add(expired_refresh_cookie()),
            Json(MessageResponse::new("Logged out")),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /v1/auth/session
#[utoipa::path(
    get,
    path = "/v1/auth/session",
    tag = "Auth",
    responses(
        (status = 200, description = "Current session user", body = SessionUser),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
) -> Response {
    match state.auth_service.session(auth_user.user_id).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_from_body() {
        let jar = CookieJar::new();
        let body = Bytes::from_static(br#"{"refresh_token":"a.b.c"}"#);
        assert_eq!(extract_refresh_token(&jar, &body).as_deref(), Some("a.b.c"));
    }

    #[test]
    fn test_cookie_takes_precedence() {
        let jar = CookieJar::new().add(Cookie::new(REFRESH_COOKIE, "from.cookie.jwt"));
        let body = Bytes::from_static(br#"{"refresh_token":"a.b.c"}"#);
        assert_eq!(
            extract_refresh_token(&jar, &body).as_deref(),
            Some("from.cookie.jwt")
        );
    }

    #[test]
    fn test_missing_refresh_token() {
        let jar = CookieJar::new();
        assert_eq!(extract_refresh_token(&jar, &Bytes::new()), None);
        assert_eq!(extract_refresh_token(&jar, &Bytes::from_static(b"not json")), None);
        assert_eq!(
            extract_refresh_token(&jar, &Bytes::from_static(br#"{"refresh_token":""}"#)),
            None
        );
    }
}

// Auth API: registration, sign-in, two-factor, email verification, token
// expiry, refresh rotation and logout

use activity_marketplace::{
    app_config,
    models::{TwoFactorToken, VerificationToken},
    schema::{two_factor_tokens, verification_tokens},
    AccessTokenClaims,
};
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use serial_test::serial;
use uuid::Uuid;

mod common;
use common::{setup_test_app, unique_email, TEST_PASSWORD};

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[tokio::test]
#[serial]
async fn test_register_then_duplicate_email() {
    let Some(app) = setup_test_app().await else { return };
    let email = unique_email("register");

    let response = app
        .post("/v1/auth/register")
        .json(&json!({ "name": "Ana", "email": &email, "password": TEST_PASSWORD }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await;
    assert_eq!(body["email"], email);
    assert!(body.get("password_hash").is_none());

    let duplicate = app
        .post("/v1/auth/register")
        .json(&json!({ "name": "Ana", "email": email.to_uppercase(), "password": TEST_PASSWORD }))
        .send()
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let weak = app
        .post("/v1/auth/register")
        .json(&json!({ "name": "Ana", "email": unique_email("weak"), "password": "short" }))
        .send()
        .await;
    assert_eq!(weak.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
async fn test_unverified_login_sends_confirmation() {
    let Some(app) = setup_test_app().await else { return };
    let email = unique_email("unverified");

    app.post("/v1/auth/register")
        .json(&json!({ "name": "Bo", "email": &email, "password": TEST_PASSWORD }))
        .send()
        .await;

    let response = app
        .post("/v1/auth/login")
        .json(&json!({ "email": &email, "password": TEST_PASSWORD }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await;
    assert_eq!(body["success"], "Confirmation email sent");
    assert!(body.get("access_token").is_none());
}

#[tokio::test]
#[serial]
async fn test_login_and_wrong_password() {
    let Some(app) = setup_test_app().await else { return };
    let (user, _) = app.create_user("user").await;

    let wrong = app
        .post("/v1/auth/login")
        .json(&json!({ "email": &user.email, "password": "Wrong1234" }))
        .send()
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .post("/v1/auth/login")
        .json(&json!({ "email": &user.email, "password": TEST_PASSWORD }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .header("set-cookie")
        .is_some_and(|c| c.starts_with("refresh_token=") && c.contains("HttpOnly")));

    let body: Value = response.json().await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["id"], json!(user.id));

    let session = app
        .get("/v1/auth/session")
        .bearer(body["access_token"].as_str().unwrap())
        .send()
        .await;
    assert_eq!(session.status(), StatusCode::OK);
}

#[tokio::test]
#[serial]
async fn test_expired_access_token_is_rejected() {
    let Some(app) = setup_test_app().await else { return };
    let (user, _) = app.create_user("user").await;
    let jwt = &app_config::config().jwt;

    let now = unix_now();
    let claims = AccessTokenClaims::for_user(
        &user,
        Uuid::new_v4().to_string(),
        jwt.audience.clone(),
        jwt.issuer.clone(),
        now - 7200,
        now - 3600,
    );
    let expired = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt.access_secret.as_bytes()),
    )
    .unwrap();

    let response = app.get("/v1/users/me").bearer(&expired).send().await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let garbage = app.get("/v1/users/me").bearer("not.a.jwt").send().await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);

    let missing = app.get("/v1/users/me").send().await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn test_refresh_rotation_detects_reuse() {
    let Some(app) = setup_test_app().await else { return };
    let (user, _) = app.create_user("user").await;

    let login: Value = app
        .post("/v1/auth/login")
        .json(&json!({ "email": &user.email, "password": TEST_PASSWORD }))
        .send()
        .await
        .json()
        .await;
    let original = login["refresh_token"].as_str().unwrap().to_string();

    let rotated = app
        .post("/v1/auth/refresh")
        .json(&json!({ "refresh_token": &original }))
        .send()
        .await;
    assert_eq!(rotated.status(), StatusCode::OK);
    let rotated: Value = rotated.json().await;
    assert_ne!(rotated["refresh_token"], json!(original));

    let reused = app
        .post("/v1/auth/refresh")
        .json(&json!({ "refresh_token": &original }))
        .send()
        .await;
    assert_eq!(reused.status(), StatusCode::UNAUTHORIZED);

    // reuse revokes the whole family
    let successor = app
        .post("/v1/auth/refresh")
        .json(&json!({ "refresh_token": rotated["refresh_token"] }))
        .send()
        .await;
    assert_eq!(successor.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn test_logout_revokes_access_token() {
    let Some(app) = setup_test_app().await else { return };
    let (user, _) = app.create_user("user").await;

    let login: Value = app
        .post("/v1/auth/login")
        .json(&json!({ "email": &user.email, "password": TEST_PASSWORD }))
        .send()
        .await
        .json()
        .await;
    let access = login["access_token"].as_str().unwrap();

    let logout = app
        .post("/v1/auth/logout")
        .bearer(access)
        .json(&json!({ "refresh_token": login["refresh_token"] }))
        .send()
        .await;
    assert_eq!(logout.status(), StatusCode::OK);

    let after = app.get("/v1/users/me").bearer(access).send().await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);

    let refresh = app
        .post("/v1/auth/refresh")
        .json(&json!({ "refresh_token": login["refresh_token"] }))
        .send()
        .await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn test_reset_does_not_reveal_accounts() {
    let Some(app) = setup_test_app().await else { return };

    let response = app
        .post("/v1/auth/reset")
        .json(&json!({ "email": unique_email("nobody") }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let bad_token = app
        .post("/v1/auth/new-password")
        .json(&json!({ "token": Uuid::new_v4().to_string(), "password": TEST_PASSWORD }))
        .send()
        .await;
    assert_eq!(bad_token.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
async fn test_two_factor_login() {
    let Some(app) = setup_test_app().await else { return };
    let (user, token) = app.create_user("user").await;
    let credentials = json!({ "email": &user.email, "password": TEST_PASSWORD });

    let enabled = app
        .patch("/v1/users/me")
        .bearer(&token)
        .json(&json!({ "is_two_factor_enabled": true }))
        .send()
        .await;
    assert_eq!(enabled.status(), StatusCode::OK);

    let challenge: Value = app
        .post("/v1/auth/login")
        .json(&credentials)
        .send()
        .await
        .json()
        .await;
    assert_eq!(challenge["two_factor"], true);
    assert!(challenge.get("access_token").is_none());

    // the mailed code is only stored hashed, so swap in a known one
    let mut conn = app.diesel_pool.get().await.unwrap();
    TwoFactorToken::upsert(&mut conn, &user.email, "482913").await.unwrap();

    let wrong = app
        .post("/v1/auth/login")
        .json(&json!({ "email": &user.email, "password": TEST_PASSWORD, "code": "111111" }))
        .send()
        .await;
    assert_eq!(wrong.status(), StatusCode::BAD_REQUEST);
    let wrong: Value = wrong.json().await;
    assert_eq!(wrong["error"], "Invalid code");

    let signed_in = app
        .post("/v1/auth/login")
        .json(&json!({ "email": &user.email, "password": TEST_PASSWORD, "code": "482913" }))
        .send()
        .await;
    assert_eq!(signed_in.status(), StatusCode::OK);
    let signed_in: Value = signed_in.json().await;
    assert!(signed_in["access_token"].is_string());
    assert_eq!(signed_in["user"]["is_two_factor_enabled"], true);

    // the code and its confirmation are single use
    let replay = app
        .post("/v1/auth/login")
        .json(&json!({ "email": &user.email, "password": TEST_PASSWORD, "code": "482913" }))
        .send()
        .await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);

    let again: Value = app
        .post("/v1/auth/login")
        .json(&credentials)
        .send()
        .await
        .json()
        .await;
    assert_eq!(again["two_factor"], true);

    // expired codes are refused even when they match
    TwoFactorToken::upsert(&mut conn, &user.email, "193746").await.unwrap();
    diesel::update(two_factor_tokens::table.filter(two_factor_tokens::email.eq(&user.email)))
        .set(two_factor_tokens::expires_at.eq(Utc::now() - Duration::minutes(1)))
        .execute(&mut conn)
        .await
        .unwrap();

    let expired = app
        .post("/v1/auth/login")
        .json(&json!({ "email": &user.email, "password": TEST_PASSWORD, "code": "193746" }))
        .send()
        .await;
    assert_eq!(expired.status(), StatusCode::BAD_REQUEST);
    let expired: Value = expired.json().await;
    assert_eq!(expired["error"], "Code expired");
}

#[tokio::test]
#[serial]
async fn test_new_verification_consumes_token() {
    let Some(app) = setup_test_app().await else { return };
    let email = unique_email("verify");

    app.post("/v1/auth/register")
        .json(&json!({ "name": "Cy", "email": &email, "password": TEST_PASSWORD }))
        .send()
        .await;

    let mut conn = app.diesel_pool.get().await.unwrap();
    VerificationToken::upsert(&mut conn, &email, None, "known-verification-token")
        .await
        .unwrap();

    let verified = app
        .post("/v1/auth/new-verification")
        .json(&json!({ "token": "known-verification-token" }))
        .send()
        .await;
    assert_eq!(verified.status(), StatusCode::OK);

    // verified accounts sign in with tokens
    let login: Value = app
        .post("/v1/auth/login")
        .json(&json!({ "email": &email, "password": TEST_PASSWORD }))
        .send()
        .await
        .json()
        .await;
    assert!(login["access_token"].is_string());

    let reused = app
        .post("/v1/auth/new-verification")
        .json(&json!({ "token": "known-verification-token" }))
        .send()
        .await;
    assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
    let reused: Value = reused.json().await;
    assert_eq!(reused["error"], "Token does not exist");

    VerificationToken::upsert(&mut conn, &email, None, "stale-verification-token")
        .await
        .unwrap();
    diesel::update(verification_tokens::table.filter(verification_tokens::email.eq(&email)))
        .set(verification_tokens::expires_at.eq(Utc::now() - Duration::minutes(1)))
        .execute(&mut conn)
        .await
        .unwrap();

    let expired = app
        .post("/v1/auth/new-verification")
        .json(&json!({ "token": "stale-verification-token" }))
        .send()
        .await;
    assert_eq!(expired.status(), StatusCode::BAD_REQUEST);
    let expired: Value = expired.json().await;
    assert_eq!(expired["error"], "Token has expired");
}

#[tokio::test]
#[serial]
async fn test_successful_login_resets_rate_limit() {
    let Some(app) = setup_test_app().await else { return };
    let (user, _) = app.create_user("user").await;
    let limit = app_config::config().security.login_rate_limit_per_ip;
    let ip = "10.44.0.7";
    for key in ["rate_limit:login:ip:10.44.0.7", "rate_limit:login:ip:10.44.0.7:blocked"] {
        app.redis_pool.del(key).await.unwrap();
    }

    for _ in 0..limit.saturating_sub(1) {
        app.post("/v1/auth/login")
            .with_ip(ip)
            .json(&json!({ "email": &user.email, "password": "Wrong1234" }))
            .send()
            .await;
    }

    let ok = app
        .post("/v1/auth/login")
        .with_ip(ip)
        .json(&json!({ "email": &user.email, "password": TEST_PASSWORD }))
        .send()
        .await;
    assert_eq!(ok.status(), StatusCode::OK);

    // the window starts over after a successful sign-in
    let next = app
        .post("/v1/auth/login")
        .with_ip(ip)
        .json(&json!({ "email": &user.email, "password": "Wrong1234" }))
        .send()
        .await;
    assert_eq!(next.status(), StatusCode::UNAUTHORIZED);
}

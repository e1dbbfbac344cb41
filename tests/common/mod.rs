// Shared harness for the integration tests. Needs PostgreSQL and Redis as
// described by `.env.test`; when they are unreachable the tests skip.
#![allow(dead_code)]

use activity_marketplace::{
    app::{create_app, AppState},
    db::{create_diesel_pool, DieselDatabaseConfig, DieselPool, RedisConfig, RedisPool},
    migrations,
    models::{Booking, Listing, NewBooking, NewListing, NewUser, Payment, User},
    schema::{bookings, listings, payments, users},
    services::{
        stripe::{NewPaymentIntent, PaymentIntent, Refund},
        JwtService, PaymentGateway, StripeError,
    },
    utils::hash_password,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, Response, StatusCode},
    Router,
};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;
use std::net::SocketAddr;
use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "Sup3rSecret";

/// Payment gateway that answers locally and counts calls
#[derive(Default)]
pub struct FakeGateway {
    pub intents_created: AtomicUsize,
    pub refunds: AtomicUsize,
    pub cancellations: AtomicUsize,
    paid: Mutex<HashSet<String>>,
}

impl FakeGateway {
    /// Report the intent as succeeded from now on, as if the guest paid
    /// before the webhook arrived
    pub fn mark_paid(&self, payment_intent_id: &str) {
        self.paid.lock().unwrap().insert(payment_intent_id.to_string());
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
        _idempotency_key: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let n = self.intents_created.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntent {
            id: format!("pi_test_{}_{}", intent.booking_id.simple(), n),
            client_secret: Some(format!("pi_test_secret_{}", n)),
            amount: intent.amount_cents,
            currency: intent.currency.clone(),
            status: "requires_payment_method".to_string(),
        })
    }

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let status = if self.paid.lock().unwrap().contains(payment_intent_id) {
            "succeeded"
        } else {
            "requires_payment_method"
        };
        Ok(PaymentIntent {
            id: payment_intent_id.to_string(),
            client_secret: Some(format!("{}_secret", payment_intent_id)),
            amount: 0,
            currency: "usd".to_string(),
            status: status.to_string(),
        })
    }

    async fn refund_payment_intent(
        &self,
        payment_intent_id: &str,
        _idempotency_key: &str,
    ) -> Result<Refund, StripeError> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        Ok(Refund {
            id: format!("re_{}", payment_intent_id),
            status: Some("succeeded".to_string()),
        })
    }

    async fn cancel_payment_intent(
        &self,
        payment_intent_id: &str,
        _idempotency_key: &str,
    ) -> Result<PaymentIntent, StripeError> {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntent {
            id: payment_intent_id.to_string(),
            client_secret: None,
            amount: 0,
            currency: "usd".to_string(),
            status: "canceled".to_string(),
        })
    }
}

/// Test application wrapper
pub struct TestApp {
    pub app: Router,
    pub diesel_pool: DieselPool,
    pub redis_pool: RedisPool,
    pub jwt_service: Arc<JwtService>,
    pub gateway: Arc<FakeGateway>,
}

impl TestApp {
    pub fn get(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "GET", uri)
    }

    pub fn post(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "POST", uri)
    }

    pub fn put(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "PUT", uri)
    }

    pub fn patch(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "PATCH", uri)
    }

    pub fn delete(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "DELETE", uri)
    }

    /// Verified user inserted directly, plus an access token for it
    pub async fn create_user(&self, role: &str) -> (User, String) {
        let mut conn = self.diesel_pool.get().await.unwrap();

        let user: User = diesel::insert_into(users::table)
            .values(NewUser {
                name: "Test User".to_string(),
                email: unique_email("user"),
                password_hash: hash_password(TEST_PASSWORD).unwrap(),
                role: role.to_string(),
            })
            .returning(User::as_returning())
            .get_result(&mut conn)
            .await
            .unwrap();

        let user: User = diesel::update(users::table.find(user.id))
            .set(users::email_verified_at.eq(Some(chrono::Utc::now())))
            .returning(User::as_returning())
            .get_result(&mut conn)
            .await
            .unwrap();

        let token = self.jwt_service.generate_access_token(&user).unwrap();
        (user, token)
    }

    pub async fn create_listing(&self, owner_id: Uuid, price_cents: i32, max_guests: i32) -> Listing {
        let mut conn = self.diesel_pool.get().await.unwrap();

        diesel::insert_into(listings::table)
            .values(NewListing {
                user_id: owner_id,
                title: "Sunset kayak tour".to_string(),
                description: "Two hours along the coast".to_string(),
                image_src: "https://example.com/kayak.jpg".to_string(),
                category: "water".to_string(),
                location: "Lisbon".to_string(),
                price_cents,
                max_guests,
            })
            .returning(Listing::as_returning())
            .get_result(&mut conn)
            .await
            .unwrap()
    }
}

impl TestApp {
    /// Booking inserted directly, so stays in the past can be set up
    pub async fn insert_booking(
        &self,
        guest_id: Uuid,
        listing: &Listing,
        start_offset_days: i64,
        end_offset_days: i64,
        status: &str,
    ) -> Booking {
        let mut conn = self.diesel_pool.get().await.unwrap();
        let today = chrono::Utc::now().date_naive();

        diesel::insert_into(bookings::table)
            .values(NewBooking {
                user_id: guest_id,
                listing_id: listing.id,
                start_date: today + chrono::Duration::days(start_offset_days),
                end_date: today + chrono::Duration::days(end_offset_days),
                guest_count: 1,
                total_price_cents: listing.price_cents as i64,
                status: status.to_string(),
            })
            .returning(Booking::as_returning())
            .get_result(&mut conn)
            .await
            .unwrap()
    }

    pub async fn payment(&self, payment_id: Uuid) -> Payment {
        let mut conn = self.diesel_pool.get().await.unwrap();
        payments::table
            .find(payment_id)
            .select(Payment::as_select())
            .first(&mut conn)
            .await
            .unwrap()
    }

    /// Deliver a webhook event signed with the configured secret
    pub async fn send_webhook(&self, event_type: &str, object: serde_json::Value) -> TestResponse {
        let payload = serde_json::to_vec(&serde_json::json!({
            "id": format!("evt_{}", Uuid::new_v4().simple()),
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap();

        let secret = &activity_marketplace::app_config::config().stripe.webhook_secret;
        let timestamp = chrono::Utc::now().timestamp();
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret.as_bytes());
        let signed = [timestamp.to_string().as_bytes(), b".", payload.as_slice()].concat();
        let signature: String = ring::hmac::sign(&key, &signed)
            .as_ref()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();

        self.post("/v1/payments/webhook")
            .header("stripe-signature", &format!("t={},v1={}", timestamp, signature))
            .header("content-type", "application/json")
            .raw_body(payload)
            .send()
            .await
    }
}

/// Test request builder
pub struct TestRequest<'a> {
    app: &'a TestApp,
    builder: axum::http::request::Builder,
    body: Body,
    custom_ip: Option<String>,
}

impl<'a> TestRequest<'a> {
    fn new(app: &'a TestApp, method: &str, uri: &str) -> Self {
        Self {
            app,
            builder: Request::builder().method(method).uri(uri),
            body: Body::empty(),
            custom_ip: None,
        }
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        self.builder = self
            .builder
            .header(header::CONTENT_TYPE, "application/json");
        self.body = Body::from(serde_json::to_vec(body).unwrap());
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.builder = self
            .builder
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Multipart form with a single file part
    pub fn multipart_file(
        mut self,
        field: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Self {
        let boundary = format!("test-boundary-{}", Uuid::new_v4().simple());
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        self.builder = self.builder.header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        );
        self.body = Body::from(body);
        self
    }

    pub fn raw_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Fixed client address, for rate limit tests
    pub fn with_ip(mut self, ip: &str) -> Self {
        self.custom_ip = Some(ip.to_string());
        self
    }

    pub async fn send(self) -> TestResponse {
        let mut request = self.builder.body(self.body).unwrap();

        // Random loopback address so unrelated tests do not share rate limits
        let addr = match self.custom_ip {
            Some(ip) => format!("{}:12345", ip),
            None => format!("127.0.{}.{}:12345", rand::random::<u8>(), rand::random::<u8>().max(1)),
        };
        request
            .extensions_mut()
            .insert(ConnectInfo(addr.parse::<SocketAddr>().unwrap()));

        let response = self.app.app.clone().oneshot(request).await.unwrap();
        TestResponse { response }
    }
}

/// Test response wrapper
pub struct TestResponse {
    response: Response<Body>,
}

impl TestResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub async fn json<T: serde::de::DeserializeOwned>(self) -> T {
        let body = axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    pub async fn text(self) -> String {
        let body = axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}_{}@example.com", prefix, Uuid::new_v4().simple())
}

/// Whether `.env.test` (or the environment) points at a database at all
pub fn database_configured() -> bool {
    dotenv::from_filename(".env.test").ok();
    std::env::var("DATABASE_URL").is_ok()
}

/// Full router over real pools and a fake payment gateway. `None` when the
/// backing services are not available.
pub async fn setup_test_app() -> Option<TestApp> {
    if !database_configured() {
        eprintln!("DATABASE_URL not set, skipping integration test");
        return None;
    }
    std::env::set_var("EMAIL_PROVIDER", "log");

    let config = activity_marketplace::app_config::config();

    let diesel_pool = match create_diesel_pool(DieselDatabaseConfig::default()).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("PostgreSQL unavailable ({}), skipping integration test", e);
            return None;
        },
    };
    migrations::run_all_migrations(&config.database.url)
        .await
        .unwrap();

    let redis_pool = match RedisPool::new(RedisConfig::from_env()).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Redis unavailable ({}), skipping integration test", e);
            return None;
        },
    };

    let gateway = Arc::new(FakeGateway::default());
    let state = AppState::new(
        config,
        diesel_pool.clone(),
        redis_pool.clone(),
        gateway.clone(),
    )
    .unwrap();
    let jwt_service = state.jwt_service.clone();

    Some(TestApp {
        app: create_app(state),
        diesel_pool,
        redis_pool,
        jwt_service,
        gateway,
    })
}

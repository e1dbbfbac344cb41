// Payment handlers: Stripe payment intents and webhook deliveries

use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::{
    app::AppState,
    middleware::AuthenticatedUser,
    models::{CreatePaymentIntentRequest, PaymentIntentResponse, SafePayment},
};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[utoipa::path(
    post,
    path = "/v1/payments/intent",
    tag = "Payments",
    operation_id = "createPaymentIntent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Client secret for the booking's payment intent", body = PaymentIntentResponse),
        (status = 400, description = "Bad request - booking is not pending"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - booking belongs to another user"),
        (status = 404, description = "Booking not found"),
        (status = 500, description = "Payment provider error")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> impl IntoResponse {
    match state
        .payment_service
        .create_payment_intent(auth_user.user_id, request.booking_id)
        .await
    {
        Ok(intent) => (StatusCode::OK, Json(intent)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// The body is taken raw: the signature covers the exact bytes Stripe sent.
#[utoipa::path(
    post,
    path = "/v1/payments/webhook",
    tag = "Payments",
    operation_id = "stripeWebhook",
    request_body(content = String, description = "Raw Stripe event JSON", content_type = "application/json"),
    params(("Stripe-Signature" = String, Header, description = "t=<timestamp>,v1=<hex hmac>")),
    responses(
        (status = 200, description = "Event received"),
        (status = 400, description = "Missing or invalid signature")
    )
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.payment_service.handle_webhook(&body, signature).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/payments",
    tag = "Payments",
    operation_id = "getMyPayments",
    responses(
        (status = 200, description = "Caller's payments, newest first", body = [SafePayment]),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_my_payments(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    match state
        .payment_service
        .get_user_payments(auth_user.user_id)
        .await
    {
        Ok(payments) => (StatusCode::OK, Json(payments)).into_response(),
        Err(e) => e.into_response(),
    }
}

use crate::{
    dto::{CheckoutSessionDetails, PaymentSessionRequest, PaymentStatus},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub id: String,
    pub status: PaymentStatus,
}

// POST /api/v1/payments/checkout-session
#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout-session",
    request_body = PaymentSessionRequest,
    responses(
        (status = 200, description = "Checkout session created", body = ApiResponse<CheckoutSessionDetails>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider rejected the request", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(request): Json<PaymentSessionRequest>,
) -> ApiResult<CheckoutSessionDetails> {
    let details = state.services.fulfillment.initiate_payment(request).await?;
    Ok(Json(ApiResponse::success(details)))
}

// GET /api/v1/payments/sessions/:id/status
#[utoipa::path(
    get,
    path = "/api/v1/payments/sessions/{id}/status",
    params(("id" = String, Path, description = "Checkout session id")),
    responses(
        (status = 200, description = "Current payment status", body = ApiResponse<PaymentStatusResponse>),
        (status = 502, description = "Payment provider unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PaymentStatusResponse> {
    let status = state.services.fulfillment.check_payment_status(&id).await?;
    Ok(Json(ApiResponse::success(PaymentStatusResponse {
        id,
        status,
    })))
}

// GET /api/v1/payments/status/:id
//
// Accepts either a checkout-session id or a payment-intent id; callers
// holding older references cannot always tell which one they have.
#[utoipa::path(
    get,
    path = "/api/v1/payments/status/{id}",
    params(("id" = String, Path, description = "Checkout session or payment intent id")),
    responses(
        (status = 200, description = "Current payment status", body = ApiResponse<PaymentStatusResponse>),
        (status = 404, description = "No session or intent under this id", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn legacy_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PaymentStatusResponse> {
    let status = state
        .services
        .fulfillment
        .check_legacy_payment_status(&id)
        .await?;
    Ok(Json(ApiResponse::success(PaymentStatusResponse {
        id,
        status,
    })))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout-session", post(create_checkout_session))
        .route("/sessions/:id/status", get(session_status))
        .route("/status/:id", get(legacy_status))
}

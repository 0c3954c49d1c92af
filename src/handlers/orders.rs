use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::OrderResponse,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrdersQuery {
    /// Owner of the orders to list
    pub user_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTrackingRequest {
    pub tracking_number: String,
    pub estimated_delivery_date: Option<DateTime<Utc>>,
}

// GET /api/v1/orders/:id
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(ApiResponse::success(order)))
}

// GET /api/v1/orders?user_id=...
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(OrdersQuery),
    responses(
        (status = 200, description = "User's orders, most recent first", body = ApiResponse<Vec<OrderResponse>>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> ApiResult<Vec<OrderResponse>> {
    let orders = state
        .services
        .orders
        .get_orders_by_user(&query.user_id)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

// PUT /api/v1/orders/:id/status
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .orders
        .update_order_status(id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

// PUT /api/v1/orders/:id/tracking
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/tracking",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateTrackingRequest,
    responses(
        (status = 200, description = "Tracking info recorded", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_tracking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTrackingRequest>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .orders
        .update_tracking_info(id, request.tracking_number, request.estimated_delivery_date)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_order_status))
        .route("/:id/tracking", put(update_tracking))
}

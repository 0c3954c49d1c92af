use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::payments::create_checkout_session,
        crate::handlers::payments::session_status,
        crate::handlers::payments::legacy_status,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::update_tracking,
    ),
    components(schemas(
        crate::dto::PaymentItem,
        crate::dto::PaymentSessionRequest,
        crate::dto::PaymentStatus,
        crate::dto::CheckoutSessionDetails,
        crate::dto::WebhookEvent,
        crate::dto::FulfillmentOutcome,
        crate::entities::order::OrderStatus,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderItemResponse,
        crate::errors::ErrorResponse,
        crate::errors::FieldViolation,
    )),
    tags(
        (name = "Payments", description = "Checkout session initiation, status polling and the provider webhook"),
        (name = "Orders", description = "Order records created by the fulfillment pipeline")
    )
)]
pub struct ApiDoc;

/// Swagger UI router, mounted at `/docs`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

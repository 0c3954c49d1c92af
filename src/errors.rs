use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::logging::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Standard error payload returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Not Found",
    "code": "not_found",
    "message": "Order with ID 550e8400-e29b-41d4-a716-446655440000 not found",
    "details": null,
    "request_id": "req-abc123xyz",
    "timestamp": "2025-06-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Gateway")
    pub error: String,
    /// Stable machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Structured detail bag (per-field validation errors, provider codes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// A single field-level validation violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldViolation {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Accumulator for validation violations. Callers collect every problem in
/// one pass so a client can fix its request in a single round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationFailures {
    pub violations: Vec<FieldViolation>,
}

impl ValidationFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: FieldViolation) {
        self.violations.push(violation);
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Returns `Ok(())` when nothing was collected, otherwise the failures.
    pub fn into_result(self) -> Result<(), ServiceError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::ValidationError(self))
        }
    }
}

impl std::fmt::Display for ValidationFailures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let summary = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{}", summary)
    }
}

/// Reasons a well-formed webhook event is still semantically unusable.
///
/// A parse failure and a legitimately empty item list carry different codes:
/// the dispatcher (and the operator reading logs) must be able to tell a
/// corrupted context apart from a session that genuinely had nothing in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookFailure {
    MissingUserId,
    ItemsUnreadable { detail: String },
    NoItems,
    UnsupportedContextVersion(u32),
}

impl WebhookFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingUserId => "webhook_missing_user",
            Self::ItemsUnreadable { .. } => "webhook_items_unreadable",
            Self::NoItems => "webhook_no_items",
            Self::UnsupportedContextVersion(_) => "webhook_context_version",
        }
    }
}

impl std::fmt::Display for WebhookFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingUserId => write!(f, "event metadata carries no user id"),
            Self::ItemsUnreadable { detail } => {
                write!(f, "item snapshot could not be parsed: {}", detail)
            }
            Self::NoItems => write!(f, "paid session resolved to zero items"),
            Self::UnsupportedContextVersion(v) => {
                write!(f, "unsupported fulfillment context version {}", v)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    ValidationError(ValidationFailures),

    #[error("Payment provider error: {message}")]
    PaymentService {
        /// Provider's own error code (e.g. "resource_missing")
        code: Option<String>,
        /// Provider's error category (e.g. "invalid_request_error")
        kind: Option<String>,
        message: String,
    },

    #[error("Order error: {0}")]
    OrderError(String),

    #[error("Webhook error: {0}")]
    WebhookError(WebhookFailure),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut failures = ValidationFailures::new();
        for (field, errors) in err.field_errors() {
            for error in errors {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| error.code.to_string());
                failures.push(FieldViolation::new(field, error.code.to_string(), message));
            }
        }
        ServiceError::ValidationError(failures)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Stable machine-readable code, safe to branch on from clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::PaymentService { .. } => "payment_provider_error",
            Self::OrderError(_) => "order_error",
            Self::WebhookError(failure) => failure.code(),
            Self::InvalidOperation(_) => "invalid_operation",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Conflict(_) => "conflict",
            Self::SerializationError(_) => "serialization_error",
            Self::ExternalServiceError(_) => "external_service_error",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::OrderError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::WebhookError(_)
            | Self::InvalidOperation(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentService { .. } | Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// messages so implementation details never leak to callers.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::SerializationError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::OrderError(_) => "Order could not be persisted".to_string(),
            _ => self.to_string(),
        }
    }

    /// Structured detail bag serialized into the error response.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::ValidationError(failures) => serde_json::to_value(&failures.violations).ok(),
            Self::PaymentService { code, kind, .. } => Some(json!({
                "provider_code": code,
                "provider_type": kind,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            details: self.details(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

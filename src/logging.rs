//! Tracing setup and request-id propagation.
//!
//! Every request carries an id (honoring an inbound `x-request-id` header)
//! that is scoped into a task-local so error responses and log lines can be
//! correlated without threading the id through every call.

use axum::http::HeaderValue;
use std::env;
use std::sync::Arc;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Initializes tracing using the provided log level as the default filter.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("fulfillment_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Opaque request identifier.
#[derive(Debug, Clone)]
pub struct RequestId(Arc<str>);

impl RequestId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn generate() -> Self {
        Self::new(format!("req-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

tokio::task_local! {
    static REQUEST_ID: RequestId;
}

/// Runs `fut` with `id` installed as the current request id.
pub async fn scope_request_id<F>(id: RequestId, fut: F) -> F::Output
where
    F: std::future::Future,
{
    REQUEST_ID.scope(id, fut).await
}

/// The request id of the current task, if one is scoped.
pub fn current_request_id() -> Option<RequestId> {
    REQUEST_ID.try_with(|rid| rid.clone()).ok()
}

/// Middleware ensuring every request runs under a request id and that the id
/// is echoed back on the response.
pub async fn request_id_middleware(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(RequestId::new)
        .unwrap_or_else(RequestId::generate);

    let header_value = HeaderValue::from_str(id.as_str()).ok();
    let mut response = scope_request_id(id, next.run(request)).await;
    if let Some(value) = header_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

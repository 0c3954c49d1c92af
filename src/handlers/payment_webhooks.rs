use crate::{
    dto::{FulfillmentOutcome, PaymentStatus, WebhookEvent},
    errors::ServiceError,
    AppState,
};
use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Provider event envelope. Only checkout-session events are acted on;
/// everything else is acknowledged and ignored.
#[derive(Debug, Deserialize)]
struct ProviderEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: ProviderEventData,
}

#[derive(Debug, Deserialize)]
struct ProviderEventData {
    object: SessionObject,
}

#[derive(Debug, Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = FulfillmentOutcome),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Invalid or unusable payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Verify signature if configured
    if let Some(secret) = state.config.payment_webhook_secret.clone() {
        let ok = verify_signature(
            &headers,
            &body,
            &secret,
            state.config.payment_webhook_tolerance_secs,
        );
        if !ok {
            warn!("Payment webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let event: ProviderEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {e}")))?;

    let outcome = match event.event_type.as_str() {
        "checkout.session.completed"
        | "checkout.session.async_payment_succeeded"
        | "checkout.session.async_payment_failed" => {
            let webhook_event = into_webhook_event(event.data.object);
            state.services.fulfillment.handle_webhook(webhook_event).await?
        }
        other => {
            info!(event_id = ?event.id, event_type = %other, "Unhandled payment webhook type");
            FulfillmentOutcome::skipped(format!("event type {other} is not handled"))
        }
    };

    Ok((axum::http::StatusCode::OK, Json(outcome)))
}

fn into_webhook_event(object: SessionObject) -> WebhookEvent {
    let payment_status = match object.payment_status.as_deref() {
        Some("paid") | Some("no_payment_required") => PaymentStatus::Paid,
        Some("unpaid") | None => PaymentStatus::Pending,
        Some(_) => PaymentStatus::Failed,
    };

    WebhookEvent {
        session_id: object.id,
        payment_status,
        amount_total: object.amount_total,
        currency: object.currency.unwrap_or_default(),
        customer_email: object.customer_email,
        metadata: object.metadata,
    }
}

fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    // Generic HMAC: x-timestamp and x-signature headers
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            if let Ok(ts_i) = ts.parse::<i64>() {
                let now = chrono::Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > tolerance_secs {
                    return false;
                }
            }
            return check_hmac(payload, secret, ts, sig);
        }
    }
    // Stripe-style support: Stripe-Signature with t=, v1=
    if let Some(sig) = headers.get("Stripe-Signature").and_then(|h| h.to_str().ok()) {
        let mut ts = "";
        let mut v1 = "";
        for part in sig.split(',') {
            let mut it = part.split('=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            if let Ok(ts_i) = ts.parse::<i64>() {
                let now = chrono::Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > tolerance_secs {
                    return false;
                }
            }
            return check_hmac(payload, secret, ts, v1);
        }
    }
    false
}

fn check_hmac(payload: &Bytes, secret: &str, timestamp: &str, signature: &str) -> bool {
    let signed = format!("{}.{}", timestamp, std::str::from_utf8(payload).unwrap_or(""));
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{metadata_for, payment_item, TestApp};
use fulfillment_api::{dto::FulfillmentOutcome, entities::order};
use hmac::{Hmac, Mac};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use sha2::Sha256;
use tower::ServiceExt;

type HmacSha256 = Hmac<Sha256>;

const WEBHOOK_SECRET: &str = "whsec_test123";

fn sign(payload: &str, timestamp: i64) -> String {
    let signed = format!("{timestamp}.{payload}");
    let mut mac = HmacSha256::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(signed.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn completed_session_payload(session_id: &str, user_id: &str) -> String {
    let metadata = metadata_for(vec![payment_item("p1", dec!(1200.00), 1)], user_id);
    serde_json::json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "payment_status": "paid",
                "amount_total": 120000,
                "currency": "eur",
                "customer_email": "customer@example.com",
                "metadata": metadata
            }
        }
    })
    .to_string()
}

fn webhook_request(payload: &str, signature_header: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature_header {
        builder = builder.header("Stripe-Signature", signature);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

async fn app_with_secret() -> TestApp {
    let mut cfg = TestApp::base_config();
    cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());
    TestApp::with_config(cfg).await
}

#[tokio::test]
async fn signed_completed_session_creates_an_order() {
    let app = app_with_secret().await;
    let payload = completed_session_payload("cs_http_1", "u1");
    let ts = chrono::Utc::now().timestamp();
    let signature = format!("t={ts},v1={}", sign(&payload, ts));

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(&payload, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let outcome: FulfillmentOutcome = serde_json::from_slice(&body).unwrap();
    assert!(outcome.success);

    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].checkout_session_id, "cs_http_1");
}

#[tokio::test]
async fn invalid_signature_is_unauthorized() {
    let app = app_with_secret().await;
    let payload = completed_session_payload("cs_http_2", "u1");
    let ts = chrono::Utc::now().timestamp();
    // Signature over a different payload.
    let signature = format!("t={ts},v1={}", sign("{}", ts));

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(&payload, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn missing_signature_is_unauthorized_when_secret_configured() {
    let app = app_with_secret().await;
    let payload = completed_session_payload("cs_http_3", "u1");

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(&payload, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_event_types_are_acknowledged_and_ignored() {
    let app = app_with_secret().await;
    let payload = serde_json::json!({
        "id": "evt_2",
        "type": "invoice.paid",
        "data": { "object": { "id": "in_1" } }
    })
    .to_string();
    let ts = chrono::Utc::now().timestamp();
    let signature = format!("t={ts},v1={}", sign(&payload, ts));

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(&payload, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let outcome: FulfillmentOutcome = serde_json::from_slice(&body).unwrap();
    assert!(!outcome.success);

    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn semantically_unusable_event_is_a_bad_request() {
    let app = app_with_secret().await;
    // Paid session whose metadata names no user.
    let mut metadata = metadata_for(vec![payment_item("p1", dec!(10.00), 1)], "u1");
    metadata.remove("user_id");
    let payload = serde_json::json!({
        "id": "evt_3",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_http_4",
                "payment_status": "paid",
                "amount_total": 1000,
                "currency": "eur",
                "metadata": metadata
            }
        }
    })
    .to_string();
    let ts = chrono::Utc::now().timestamp();
    let signature = format!("t={ts},v1={}", sign(&payload, ts));

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(&payload, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert!(orders.is_empty());
}

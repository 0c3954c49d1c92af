mod common;

use assert_matches::assert_matches;
use common::{payment_item, TestApp};
use fulfillment_api::{
    dto::PaymentSessionRequest,
    entities::order,
    errors::ServiceError,
};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_request() -> PaymentSessionRequest {
    PaymentSessionRequest {
        items: vec![payment_item("p1", dec!(19.99), 2)],
        user_id: "u1".to_string(),
        user_email: "customer@example.com".to_string(),
        success_url: "https://shop.example.com/success".to_string(),
        cancel_url: "https://shop.example.com/cancel".to_string(),
        metadata: HashMap::new(),
    }
}

async fn order_count(app: &TestApp) -> usize {
    order::Entity::find()
        .all(&*app.state.db)
        .await
        .expect("failed to list orders")
        .len()
}

#[tokio::test]
async fn initiate_payment_never_writes_an_order() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_new",
            "url": "https://checkout.stripe.com/c/pay/cs_new"
        })))
        .mount(&provider)
        .await;

    let mut cfg = TestApp::base_config();
    cfg.stripe_api_base = Some(provider.uri());
    let app = TestApp::with_config(cfg).await;

    let details = app
        .state
        .services
        .fulfillment
        .initiate_payment(session_request())
        .await
        .expect("session creation should succeed");

    assert_eq!(details.session_id, "cs_new");
    // Nothing is persisted until the provider confirms payment.
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_any_provider_call() {
    // No mock provider mounted: a provider call would fail loudly.
    let app = TestApp::new().await;

    let mut request = session_request();
    request.items[0].quantity = 0;
    request.items[0].price = dec!(0.00);
    request.user_email = "not-an-email".to_string();

    let err = app
        .state
        .services
        .fulfillment
        .initiate_payment(request)
        .await
        .unwrap_err();

    match err {
        ServiceError::ValidationError(failures) => {
            let fields: Vec<&str> = failures
                .violations
                .iter()
                .map(|v| v.field.as_str())
                .collect();
            assert!(fields.contains(&"items[0].quantity"));
            assert!(fields.contains(&"items[0].price"));
            assert!(fields.contains(&"user_email"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn provider_rejection_surfaces_as_payment_service_error() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
            "error": {
                "code": "card_declined",
                "type": "card_error",
                "message": "Your card was declined."
            }
        })))
        .mount(&provider)
        .await;

    let mut cfg = TestApp::base_config();
    cfg.stripe_api_base = Some(provider.uri());
    let app = TestApp::with_config(cfg).await;

    let err = app
        .state
        .services
        .fulfillment
        .initiate_payment(session_request())
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::PaymentService { .. });
    assert_eq!(order_count(&app).await, 0);
}

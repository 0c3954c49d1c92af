mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{payment_item, TestApp};
use fulfillment_api::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::CreateOrderRequest,
};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use uuid::Uuid;

fn create_request(session_id: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id: "u1".to_string(),
        user_email: "customer@example.com".to_string(),
        items: vec![
            payment_item("p1", dec!(19.99), 2),
            payment_item("p2", dec!(5.00), 1),
        ],
        total_amount: dec!(44.98),
        currency: "eur".to_string(),
        payment_method: "card".to_string(),
        checkout_session_id: session_id.to_string(),
        status: OrderStatus::Paid,
        metadata: None,
    }
}

#[tokio::test]
async fn create_and_fetch_order_with_items() {
    let app = TestApp::new().await;

    let created = app
        .state
        .services
        .orders
        .create_order(create_request("cs_store_1"))
        .await
        .unwrap();

    let fetched = app
        .state
        .services
        .orders
        .get_order(created.id)
        .await
        .unwrap()
        .expect("order should exist");

    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.status, OrderStatus::Paid);
    assert_eq!(fetched.total_amount, dec!(44.98));
    assert_eq!(fetched.items.len(), 2);
    // Absent optionals persist as NULL and read back as None.
    assert!(fetched.tracking_number.is_none());
    assert!(fetched.estimated_delivery_date.is_none());
    assert!(fetched.items[0].description.is_none());
}

#[tokio::test]
async fn empty_item_list_is_an_order_error() {
    let app = TestApp::new().await;
    let mut request = create_request("cs_store_empty");
    request.items.clear();

    let err = app
        .state
        .services
        .orders
        .create_order(request)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OrderError(_));
}

#[tokio::test]
async fn find_by_checkout_session_round_trips() {
    let app = TestApp::new().await;
    let created = app
        .state
        .services
        .orders
        .create_order(create_request("cs_store_2"))
        .await
        .unwrap();

    let found = app
        .state
        .services
        .orders
        .find_by_checkout_session("cs_store_2")
        .await
        .unwrap()
        .expect("order should be found by session id");
    assert_eq!(found.id, created.id);

    let missing = app
        .state
        .services
        .orders
        .find_by_checkout_session("cs_unknown")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn duplicate_session_id_is_rejected_by_the_store() {
    let app = TestApp::new().await;
    app.state
        .services
        .orders
        .create_order(create_request("cs_store_dup"))
        .await
        .unwrap();

    let err = app
        .state
        .services
        .orders
        .create_order(create_request("cs_store_dup"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DatabaseError(_));
}

#[tokio::test]
async fn orders_by_user_are_most_recent_first() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;

    let first = orders.create_order(create_request("cs_user_1")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = orders.create_order(create_request("cs_user_2")).await.unwrap();

    let mut other_user = create_request("cs_user_3");
    other_user.user_id = "u2".to_string();
    orders.create_order(other_user).await.unwrap();

    let listed = orders.get_orders_by_user("u1").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);
}

#[tokio::test]
async fn status_updates_and_tracking_info() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let created = orders.create_order(create_request("cs_ship_1")).await.unwrap();

    let processing = orders
        .update_order_status(created.id, OrderStatus::Processing)
        .await
        .unwrap();
    assert_eq!(processing.status, OrderStatus::Processing);

    let eta = Utc::now() + Duration::days(3);
    let shipped = orders
        .update_tracking_info(created.id, "TRK-123".to_string(), Some(eta))
        .await
        .unwrap();
    assert_eq!(shipped.tracking_number.as_deref(), Some("TRK-123"));
    assert!(shipped.estimated_delivery_date.is_some());

    let err = orders
        .update_order_status(Uuid::new_v4(), OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn metadata_is_persisted_when_populated() {
    let app = TestApp::new().await;
    let mut request = create_request("cs_meta_1");
    request.metadata = Some(HashMap::from([(
        "campaign".to_string(),
        "spring".to_string(),
    )]));

    let created = app
        .state
        .services
        .orders
        .create_order(request)
        .await
        .unwrap();

    // Read the raw row back to check the populated field was not dropped.
    use fulfillment_api::entities::order;
    use sea_orm::EntityTrait;
    let row = order::Entity::find_by_id(created.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let metadata = row.metadata.expect("metadata should persist");
    assert_eq!(metadata["campaign"], "spring");
}

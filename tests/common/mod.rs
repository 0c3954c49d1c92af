#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::Utc;
use fulfillment_api::{
    config::AppConfig,
    db,
    dto::{FulfillmentContext, PaymentItem, PaymentSessionRequest},
    entities::{abandoned_cart, product},
    events::{self, EventSender},
    handlers::AppServices,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Helper harness spinning up an application state backed by an in-memory
/// SQLite database.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(Self::base_config()).await
    }

    pub fn base_config() -> AppConfig {
        let mut cfg = AppConfig::new("sqlite::memory:", "sk_test_xxx", "127.0.0.1", 0, "test");
        // A single connection keeps the in-memory database alive and shared.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build http client");

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), &cfg, http);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", fulfillment_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            state,
            router,
            _event_task: event_task,
        }
    }

    /// Inserts a catalog product and returns its document id.
    pub async fn seed_product(&self, legacy_id: Option<i64>, stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        product::ActiveModel {
            id: Set(id),
            legacy_id: Set(legacy_id),
            name: Set(format!("Product {id}")),
            stock_quantity: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed product");
        id
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("failed to load product")
            .expect("product missing")
            .stock_quantity
    }

    /// Inserts an abandoned cart for `user_id`.
    pub async fn seed_abandoned_cart(&self, user_id: &str, total: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        abandoned_cart::ActiveModel {
            id: Set(id),
            user_id: Set(user_id.to_string()),
            items: Set(serde_json::json!([{"id": "p1", "quantity": 1}])),
            total: Set(total),
            reminder_sent: Set(false),
            recovered: Set(false),
            recovered_at: Set(None),
            created_at: Set(now),
            last_updated: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed cart");
        id
    }

    pub async fn cart_count(&self, user_id: &str) -> usize {
        use sea_orm::{ColumnTrait, QueryFilter};
        abandoned_cart::Entity::find()
            .filter(abandoned_cart::Column::UserId.eq(user_id))
            .all(&*self.state.db)
            .await
            .expect("failed to list carts")
            .len()
    }
}

/// Builds the webhook metadata a real checkout session would carry.
pub fn metadata_for(items: Vec<PaymentItem>, user_id: &str) -> HashMap<String, String> {
    let request = PaymentSessionRequest {
        items,
        user_id: user_id.to_string(),
        user_email: "customer@example.com".to_string(),
        success_url: "https://shop.example.com/success".to_string(),
        cancel_url: "https://shop.example.com/cancel".to_string(),
        metadata: HashMap::new(),
    };
    FulfillmentContext::new(&request)
        .to_metadata(&request.metadata)
        .expect("failed to serialize context")
}

pub fn payment_item(id: impl Into<String>, price: Decimal, quantity: i32) -> PaymentItem {
    PaymentItem {
        id: id.into(),
        name: "Test product".to_string(),
        price,
        quantity,
        description: None,
        image_url: None,
    }
}

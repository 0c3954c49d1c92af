pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    notifications::{NoopNotifier, Notifier, NotifierStack, ResendNotifier},
    services::{
        carts::CartRecoveryService,
        fulfillment::FulfillmentService,
        inventory::InventoryService,
        orders::OrderService,
        payment_gateway::{StripeConfig, StripeGateway},
    },
};
use std::sync::Arc;

/// Aggregated services used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub inventory: Arc<InventoryService>,
    pub carts: Arc<CartRecoveryService>,
    pub fulfillment: Arc<FulfillmentService>,
}

impl AppServices {
    /// Wires every service against one DB pool and one shared HTTP client.
    /// The client is constructed once here and reused for the lifetime of
    /// the process by both the payment gateway and the notifier.
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        http: reqwest::Client,
    ) -> Self {
        let orders = Arc::new(OrderService::new(db.clone(), Some(event_sender.clone())));
        let inventory = Arc::new(InventoryService::new(db.clone(), Some(event_sender.clone())));
        let carts = Arc::new(CartRecoveryService::new(db, Some(event_sender.clone())));

        let gateway = Arc::new(StripeGateway::new(StripeConfig::from(config), http.clone()));

        let email: Arc<dyn Notifier> = Arc::new(ResendNotifier::new(config, http));
        let fallback: Arc<dyn Notifier> = Arc::new(NoopNotifier);
        let notifiers = Arc::new(NotifierStack::new(vec![email, fallback]));

        let fulfillment = Arc::new(FulfillmentService::new(
            gateway,
            orders.clone(),
            inventory.clone(),
            carts.clone(),
            notifiers,
            Some(event_sender),
        ));

        Self {
            orders,
            inventory,
            carts,
            fulfillment,
        }
    }
}

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// The various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Payment events
    PaymentSessionCreated {
        session_id: String,
        user_id: String,
    },
    PaymentCaptured {
        order_id: Uuid,
        session_id: String,
    },
    PaymentFailed {
        session_id: String,
    },

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Inventory events
    InventoryAdjusted {
        product_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
    },

    // Cart events
    CartRecovered {
        cart_id: Uuid,
        user_id: String,
    },

    // Notification events
    NotificationSent {
        order_id: Uuid,
        channel: String,
    },
}

/// Consumes events from the channel, logging each one. Side-effectful
/// handlers attach here as the system grows.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match event {
            Event::PaymentSessionCreated {
                ref session_id,
                ref user_id,
            } => {
                info!(%session_id, %user_id, "Checkout session created");
            }
            Event::PaymentCaptured {
                order_id,
                ref session_id,
            } => {
                info!(%order_id, %session_id, "Payment captured");
            }
            Event::PaymentFailed { ref session_id } => {
                warn!(%session_id, "Payment failed");
            }
            Event::OrderCreated(order_id) => {
                info!(%order_id, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                ref old_status,
                ref new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::InventoryAdjusted {
                product_id,
                old_quantity,
                new_quantity,
            } => {
                info!(%product_id, old_quantity, new_quantity, "Inventory adjusted");
                if new_quantity < 10 {
                    warn!(
                        "Low inventory alert: product {} has only {} units remaining",
                        product_id, new_quantity
                    );
                }
            }
            Event::CartRecovered {
                cart_id,
                ref user_id,
            } => {
                info!(%cart_id, %user_id, "Abandoned cart recovered");
            }
            Event::NotificationSent {
                order_id,
                ref channel,
            } => {
                info!(%order_id, %channel, "Notification sent");
            }
        }
    }

    warn!("Event processing loop has ended");
}

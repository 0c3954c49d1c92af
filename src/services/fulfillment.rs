//! The payment-confirmation fulfillment pipeline.
//!
//! One verified webhook event drives a fixed, failure-isolated sequence:
//! create the order (fatal on failure), then adjust inventory, reconcile
//! abandoned carts and notify (each best-effort). The payment is already
//! captured by the time this runs, so nothing after order creation may
//! block or reverse the attempt.

use crate::{
    dto::{
        CheckoutSessionDetails, FulfillmentContext, FulfillmentOutcome, PaymentSessionRequest,
        PaymentStatus, WebhookEvent,
    },
    entities::order::OrderStatus,
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{NotificationError, NotifierStack},
    services::{
        carts::CartRecoveryService,
        inventory::InventoryService,
        orders::{CreateOrderRequest, OrderResponse, OrderService},
        payment_gateway::{from_minor_units, StripeGateway},
    },
    validation,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Clone)]
pub struct FulfillmentService {
    gateway: Arc<StripeGateway>,
    orders: Arc<OrderService>,
    inventory: Arc<InventoryService>,
    carts: Arc<CartRecoveryService>,
    notifiers: Arc<NotifierStack>,
    event_sender: Option<Arc<EventSender>>,
}

impl FulfillmentService {
    pub fn new(
        gateway: Arc<StripeGateway>,
        orders: Arc<OrderService>,
        inventory: Arc<InventoryService>,
        carts: Arc<CartRecoveryService>,
        notifiers: Arc<NotifierStack>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            gateway,
            orders,
            inventory,
            carts,
            notifiers,
            event_sender,
        }
    }

    /// Validates the request and opens a hosted checkout session.
    ///
    /// Nothing is persisted here: the order only comes into existence when
    /// the provider confirms payment through the webhook. The item snapshot
    /// travels inside the session metadata so the webhook can reconstruct
    /// the order without re-querying the cart.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn initiate_payment(
        &self,
        request: PaymentSessionRequest,
    ) -> Result<CheckoutSessionDetails, ServiceError> {
        validation::validate_payment_request(&request)?;

        let context = FulfillmentContext::new(&request);
        let details = self
            .gateway
            .create_checkout_session(&request, &context)
            .await?;

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::PaymentSessionCreated {
                    session_id: details.session_id.clone(),
                    user_id: request.user_id.clone(),
                })
                .await
            {
                warn!(error = %e, "Failed to send session created event");
            }
        }

        Ok(details)
    }

    /// Client-triggered payment status poll, independent of the webhook path.
    pub async fn check_payment_status(
        &self,
        session_id: &str,
    ) -> Result<PaymentStatus, ServiceError> {
        self.gateway.verify_status(session_id).await
    }

    /// Status poll tolerant of session or payment-intent identifiers.
    pub async fn check_legacy_payment_status(
        &self,
        id: &str,
    ) -> Result<PaymentStatus, ServiceError> {
        self.gateway.fetch_legacy_status(id).await
    }

    /// Processes one verified provider notification.
    ///
    /// Only `Paid` events with metadata trigger fulfillment; anything else
    /// is a no-op reported back, never retried internally. A session that
    /// already produced an order short-circuits to that order: deliveries
    /// are at-least-once and must collapse to exactly one order.
    #[instrument(skip(self, event), fields(session_id = %event.session_id, status = ?event.payment_status))]
    pub async fn handle_webhook(
        &self,
        event: WebhookEvent,
    ) -> Result<FulfillmentOutcome, ServiceError> {
        if event.payment_status != PaymentStatus::Paid {
            info!("Ignoring webhook with non-paid status");
            if event.payment_status == PaymentStatus::Failed {
                if let Some(event_sender) = &self.event_sender {
                    let _ = event_sender
                        .send(Event::PaymentFailed {
                            session_id: event.session_id.clone(),
                        })
                        .await;
                }
            }
            return Ok(FulfillmentOutcome::skipped(format!(
                "payment status is {:?}, nothing to fulfill",
                event.payment_status
            )));
        }
        if event.metadata.is_empty() {
            warn!("Paid webhook without metadata, cannot reconstruct order");
            return Ok(FulfillmentOutcome::skipped(
                "event carries no metadata, nothing to fulfill",
            ));
        }

        let context = FulfillmentContext::from_metadata(&event.metadata)
            .map_err(ServiceError::WebhookError)?;

        // Idempotency: deliveries are at-least-once, orders are exactly-once.
        if let Some(existing) = self
            .orders
            .find_by_checkout_session(&event.session_id)
            .await?
        {
            info!(order_id = %existing.id, "Session already fulfilled");
            return Ok(FulfillmentOutcome::already_fulfilled(existing.id));
        }

        let order = self.create_order(&event, &context).await?;

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::PaymentCaptured {
                    order_id: order.id,
                    session_id: event.session_id.clone(),
                })
                .await
            {
                warn!(error = %e, "Failed to send payment captured event");
            }
        }

        // From here on the order exists and the payment is captured; the
        // remaining steps run to completion or individual failure.
        self.adjust_inventory(&context).await;
        self.reconcile_carts(&context).await;
        self.notify(&order).await;

        Ok(FulfillmentOutcome::fulfilled(order.id))
    }

    /// Fatal step: the order is the durable record of the captured payment.
    async fn create_order(
        &self,
        event: &WebhookEvent,
        context: &FulfillmentContext,
    ) -> Result<OrderResponse, ServiceError> {
        // The provider's captured amount is authoritative; the context total
        // is the fallback when the provider omits it.
        let total_amount = event
            .amount_total
            .map(from_minor_units)
            .unwrap_or(context.total_amount);

        let user_email = context
            .user_email
            .clone()
            .or_else(|| event.customer_email.clone())
            .unwrap_or_default();

        let request = CreateOrderRequest {
            user_id: context.user_id.clone(),
            user_email,
            items: context.items.clone(),
            total_amount,
            currency: event.currency.clone(),
            payment_method: "card".to_string(),
            checkout_session_id: event.session_id.clone(),
            status: OrderStatus::Paid,
            metadata: Some(event.metadata.clone()),
        };

        match self.orders.create_order(request).await {
            Ok(order) => Ok(order),
            // A concurrent delivery for the same session can win the insert
            // race; the unique index turns that into a conflict we resolve
            // by returning the winner's order.
            Err(ServiceError::DatabaseError(db_err))
                if is_unique_violation(&db_err) =>
            {
                warn!("Lost order-insert race, fetching existing order");
                self.orders
                    .find_by_checkout_session(&event.session_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::OrderError(
                            "duplicate session insert detected but order not found".to_string(),
                        )
                    })
            }
            Err(e) => {
                error!(error = %e, "Order creation failed, aborting fulfillment");
                Err(e)
            }
        }
    }

    /// Best-effort step: bookkeeping must not block fulfillment.
    async fn adjust_inventory(&self, context: &FulfillmentContext) {
        let summary = self.inventory.decrement_for_items(&context.items).await;
        if !summary.failures.is_empty() {
            warn!(
                failed = summary.failures.len(),
                attempted = summary.attempted,
                "Some stock decrements failed; order remains fulfilled"
            );
        }
    }

    /// Best-effort step: a missing cart is the common case.
    async fn reconcile_carts(&self, context: &FulfillmentContext) {
        if let Err(e) = self.carts.reconcile_user(&context.user_id).await {
            warn!(user_id = %context.user_id, error = %e, "Cart reconciliation failed");
        }
    }

    /// Best-effort step: the operator alert is only attempted once the
    /// customer confirmation went out.
    async fn notify(&self, order: &OrderResponse) {
        if !self.notifiers.is_configured() {
            info!("No notification channel configured, skipping");
            return;
        }

        match self.notifiers.send_order_confirmation(order).await {
            Ok(receipt) => {
                info!(message_id = ?receipt.message_id, "Customer confirmation sent");
                if let Some(event_sender) = &self.event_sender {
                    let _ = event_sender
                        .send(Event::NotificationSent {
                            order_id: order.id,
                            channel: "email".to_string(),
                        })
                        .await;
                }
                match self.notifiers.send_operator_alert(order).await {
                    Ok(_) => info!("Operator alert sent"),
                    Err(NotificationError::NotConfigured) => {
                        info!("No operator recipient configured, skipping alert")
                    }
                    Err(e) => warn!(error = %e, "Operator alert failed"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Customer confirmation failed; a client-initiated channel may still notify them");
            }
        }
    }
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("unique") || message.contains("duplicate key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_detection() {
        let err = sea_orm::DbErr::Custom(
            "UNIQUE constraint failed: orders.checkout_session_id".to_string(),
        );
        assert!(is_unique_violation(&err));

        let err = sea_orm::DbErr::Custom(
            "duplicate key value violates unique constraint \"idx_orders_checkout_session_id\""
                .to_string(),
        );
        assert!(is_unique_violation(&err));

        let err = sea_orm::DbErr::Custom("connection reset".to_string());
        assert!(!is_unique_violation(&err));
    }
}

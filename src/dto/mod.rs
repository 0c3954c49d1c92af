//! Wire-facing types shared by the payment gateway, the orchestrator and the
//! HTTP handlers.

use crate::errors::WebhookFailure;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

/// Current serialization version of [`FulfillmentContext`]. Bump when the
/// item snapshot shape changes so in-flight sessions fail loudly instead of
/// parsing wrong.
pub const CONTEXT_VERSION: u32 = 1;

const META_CONTEXT_VERSION: &str = "context_version";
const META_USER_ID: &str = "user_id";
const META_USER_EMAIL: &str = "user_email";
const META_ITEMS: &str = "items";
const META_TOTAL_AMOUNT: &str = "total_amount";
const META_ITEMS_COUNT: &str = "items_count";

/// Immutable line-item snapshot taken at checkout time.
///
/// Deliberately decoupled from the live catalog: later price or description
/// edits cannot retroactively change a paid order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentItem {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl PaymentItem {
    /// Line total (unit price times quantity).
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A request to start a hosted checkout session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentSessionRequest {
    pub items: Vec<PaymentItem>,
    pub user_id: String,
    pub user_email: String,
    pub success_url: String,
    pub cancel_url: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentSessionRequest {
    /// Sum of `price * quantity` over all items.
    pub fn total_amount(&self) -> Decimal {
        self.items.iter().map(PaymentItem::line_total).sum()
    }
}

/// Provider-side payment state as seen by a status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Paid,
    Pending,
    Failed,
}

/// Result of creating a hosted checkout session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSessionDetails {
    pub session_id: String,
    /// Redirect URL for the customer to complete payment.
    pub url: String,
}

/// A verified payment-provider notification, as handed to the orchestrator.
///
/// Deliveries are at-least-once: the same event may arrive twice, and events
/// may arrive out of order relative to the user's later actions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookEvent {
    pub session_id: String,
    pub payment_status: PaymentStatus,
    /// Captured amount in integer minor units (e.g. cents), when provided.
    pub amount_total: Option<i64>,
    pub currency: String,
    pub customer_email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Structured snapshot carried through the provider's string-keyed metadata
/// so the later, stateless webhook can reconstruct the order without
/// re-querying the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentContext {
    pub version: u32,
    pub user_id: String,
    pub user_email: Option<String>,
    pub items: Vec<PaymentItem>,
    pub total_amount: Decimal,
    pub items_count: u32,
}

impl FulfillmentContext {
    pub fn new(request: &PaymentSessionRequest) -> Self {
        Self {
            version: CONTEXT_VERSION,
            user_id: request.user_id.clone(),
            user_email: Some(request.user_email.clone()),
            items: request.items.clone(),
            total_amount: request.total_amount(),
            items_count: request.items.len() as u32,
        }
    }

    /// Folds this context into `base`, overwriting the reserved keys.
    pub fn to_metadata(
        &self,
        base: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, serde_json::Error> {
        let mut metadata = base.clone();
        metadata.insert(META_CONTEXT_VERSION.into(), self.version.to_string());
        metadata.insert(META_USER_ID.into(), self.user_id.clone());
        if let Some(email) = &self.user_email {
            metadata.insert(META_USER_EMAIL.into(), email.clone());
        }
        metadata.insert(META_ITEMS.into(), serde_json::to_string(&self.items)?);
        metadata.insert(META_TOTAL_AMOUNT.into(), self.total_amount.to_string());
        metadata.insert(META_ITEMS_COUNT.into(), self.items_count.to_string());
        Ok(metadata)
    }

    /// Reconstructs a context from webhook metadata.
    ///
    /// Missing user id, an unreadable item snapshot, and a parsed-but-empty
    /// item list are three distinct failures; nothing is coerced silently.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Result<Self, WebhookFailure> {
        let version = match metadata.get(META_CONTEXT_VERSION) {
            // Sessions created before versioning may still be in flight.
            None => {
                debug!("metadata carries no context version, assuming v1");
                1
            }
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| WebhookFailure::UnsupportedContextVersion(0))?,
        };
        if version > CONTEXT_VERSION {
            return Err(WebhookFailure::UnsupportedContextVersion(version));
        }

        let user_id = metadata
            .get(META_USER_ID)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or(WebhookFailure::MissingUserId)?
            .to_string();

        let items: Vec<PaymentItem> = match metadata.get(META_ITEMS) {
            None => return Err(WebhookFailure::NoItems),
            Some(raw) => serde_json::from_str(raw).map_err(|e| WebhookFailure::ItemsUnreadable {
                detail: e.to_string(),
            })?,
        };
        if items.is_empty() {
            return Err(WebhookFailure::NoItems);
        }

        let computed_total: Decimal = items.iter().map(PaymentItem::line_total).sum();
        let total_amount = metadata
            .get(META_TOTAL_AMOUNT)
            .and_then(|raw| raw.parse::<Decimal>().ok())
            .unwrap_or(computed_total);
        let items_count = metadata
            .get(META_ITEMS_COUNT)
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(items.len() as u32);

        Ok(Self {
            version,
            user_id,
            user_email: metadata.get(META_USER_EMAIL).cloned(),
            items,
            total_amount,
            items_count,
        })
    }
}

/// Terminal result of one webhook fulfillment attempt.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FulfillmentOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    pub message: String,
}

impl FulfillmentOutcome {
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            message: message.into(),
        }
    }

    pub fn fulfilled(order_id: Uuid) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            message: "order created and fulfillment completed".into(),
        }
    }

    pub fn already_fulfilled(order_id: Uuid) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            message: "session already fulfilled, returning existing order".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(id: &str, price: Decimal, quantity: i32) -> PaymentItem {
        PaymentItem {
            id: id.into(),
            name: format!("Item {id}"),
            price,
            quantity,
            description: None,
            image_url: None,
        }
    }

    fn request() -> PaymentSessionRequest {
        PaymentSessionRequest {
            items: vec![item("p1", dec!(19.99), 2), item("p2", dec!(5.00), 1)],
            user_id: "u1".into(),
            user_email: "user@example.com".into(),
            success_url: "https://shop.example.com/success".into(),
            cancel_url: "https://shop.example.com/cancel".into(),
            metadata: HashMap::from([("campaign".to_string(), "spring".to_string())]),
        }
    }

    #[test]
    fn total_amount_sums_line_totals() {
        assert_eq!(request().total_amount(), dec!(44.98));
    }

    #[test]
    fn context_round_trips_through_metadata() {
        let req = request();
        let ctx = FulfillmentContext::new(&req);
        let metadata = ctx.to_metadata(&req.metadata).unwrap();

        // Caller-supplied keys survive alongside the reserved ones.
        assert_eq!(metadata.get("campaign").map(String::as_str), Some("spring"));

        let parsed = FulfillmentContext::from_metadata(&metadata).unwrap();
        assert_eq!(parsed, ctx);
    }

    #[test]
    fn missing_user_id_is_its_own_failure() {
        let req = request();
        let mut metadata = FulfillmentContext::new(&req).to_metadata(&req.metadata).unwrap();
        metadata.remove("user_id");
        assert_eq!(
            FulfillmentContext::from_metadata(&metadata),
            Err(WebhookFailure::MissingUserId)
        );
    }

    #[test]
    fn unreadable_items_differ_from_no_items() {
        let req = request();
        let base = FulfillmentContext::new(&req).to_metadata(&req.metadata).unwrap();

        let mut corrupted = base.clone();
        corrupted.insert("items".into(), "{not json".into());
        assert!(matches!(
            FulfillmentContext::from_metadata(&corrupted),
            Err(WebhookFailure::ItemsUnreadable { .. })
        ));

        let mut empty = base.clone();
        empty.insert("items".into(), "[]".into());
        assert_eq!(
            FulfillmentContext::from_metadata(&empty),
            Err(WebhookFailure::NoItems)
        );

        let mut absent = base;
        absent.remove("items");
        assert_eq!(
            FulfillmentContext::from_metadata(&absent),
            Err(WebhookFailure::NoItems)
        );
    }

    #[test]
    fn future_context_version_is_rejected() {
        let req = request();
        let mut metadata = FulfillmentContext::new(&req).to_metadata(&req.metadata).unwrap();
        metadata.insert("context_version".into(), "2".into());
        assert_eq!(
            FulfillmentContext::from_metadata(&metadata),
            Err(WebhookFailure::UnsupportedContextVersion(2))
        );
    }

    #[test]
    fn missing_version_is_accepted_as_v1() {
        let req = request();
        let mut metadata = FulfillmentContext::new(&req).to_metadata(&req.metadata).unwrap();
        metadata.remove("context_version");
        let parsed = FulfillmentContext::from_metadata(&metadata).unwrap();
        assert_eq!(parsed.version, 1);
    }
}

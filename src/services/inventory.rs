use crate::{
    db::DbPool,
    dto::PaymentItem,
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Per-batch result of a best-effort stock adjustment.
#[derive(Debug, Default)]
pub struct StockDecrementSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<StockDecrementFailure>,
}

#[derive(Debug)]
pub struct StockDecrementFailure {
    pub product_ref: String,
    pub reason: String,
}

/// Service for stock bookkeeping. The fulfillment pipeline only decrements,
/// and stock floors at zero rather than going negative.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl InventoryService {
    /// Creates a new inventory service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Decrements stock for one product reference.
    ///
    /// The reference is resolved against the catalog's real storage key: a
    /// Uuid document id when it parses as one, otherwise the human-facing
    /// legacy numeric id. Simple read-modify-write; over-selling a few units
    /// under race is an accepted business risk, not a correctness bug.
    #[instrument(skip(self))]
    pub async fn decrement_stock(
        &self,
        product_ref: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "decrement quantity must be positive, got {quantity}"
            )));
        }

        let db = &*self.db_pool;
        let product = self.resolve_product(product_ref).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("product {product_ref} not found in catalog"))
        })?;

        let old_quantity = product.stock_quantity;
        let new_quantity = (old_quantity - quantity).max(0);
        let product_id = product.id;

        let mut active: product::ActiveModel = product.into();
        active.stock_quantity = Set(new_quantity);
        active.updated_at = Set(Utc::now());
        active.update(db).await.map_err(ServiceError::DatabaseError)?;

        info!(
            product_id = %product_id,
            old_quantity,
            new_quantity,
            "Stock decremented"
        );

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::InventoryAdjusted {
                    product_id,
                    old_quantity,
                    new_quantity,
                })
                .await
            {
                warn!(error = %e, product_id = %product_id, "Failed to send inventory event");
            }
        }

        Ok(())
    }

    /// Decrements stock for every line item of a fulfilled order.
    ///
    /// Runs after payment capture, so by contract this cannot fail the
    /// caller: per-item failures are collected and logged, and the summary
    /// is returned even when every single item failed.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn decrement_for_items(&self, items: &[PaymentItem]) -> StockDecrementSummary {
        let mut summary = StockDecrementSummary {
            attempted: items.len(),
            ..Default::default()
        };

        for item in items {
            match self.decrement_stock(&item.id, item.quantity).await {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    warn!(product_ref = %item.id, error = %e, "Stock decrement failed");
                    summary.failures.push(StockDecrementFailure {
                        product_ref: item.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if summary.failures.is_empty() {
            info!(succeeded = summary.succeeded, "Stock adjusted for all items");
        } else {
            warn!(
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                failed = summary.failures.len(),
                "Stock adjustment completed with failures"
            );
        }

        summary
    }

    async fn resolve_product(
        &self,
        product_ref: &str,
    ) -> Result<Option<product::Model>, ServiceError> {
        let db = &*self.db_pool;

        if let Ok(id) = Uuid::parse_str(product_ref) {
            return ProductEntity::find_by_id(id)
                .one(db)
                .await
                .map_err(ServiceError::DatabaseError);
        }

        if let Ok(legacy_id) = product_ref.parse::<i64>() {
            return ProductEntity::find()
                .filter(product::Column::LegacyId.eq(legacy_id))
                .one(db)
                .await
                .map_err(ServiceError::DatabaseError);
        }

        Ok(None)
    }
}

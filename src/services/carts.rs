use crate::{
    db::DbPool,
    entities::abandoned_cart::{self, Entity as AbandonedCartEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Service reconciling abandoned-cart records once their owner completes a
/// paid order.
#[derive(Clone)]
pub struct CartRecoveryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl CartRecoveryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Marks every non-recovered cart of `user_id` as recovered, then
    /// deletes all of the user's cart rows. The recovery marking feeds
    /// re-engagement bookkeeping; the deletion is the operative cleanup.
    ///
    /// A user with no abandoned cart is the common case, not an error.
    #[instrument(skip(self))]
    pub async fn reconcile_user(&self, user_id: &str) -> Result<u64, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let carts = AbandonedCartEntity::find()
            .filter(abandoned_cart::Column::UserId.eq(user_id))
            .filter(abandoned_cart::Column::Recovered.eq(false))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let recovered = carts.len() as u64;

        for cart in carts {
            let cart_id = cart.id;
            let mut active: abandoned_cart::ActiveModel = cart.into();
            active.recovered = Set(true);
            active.recovered_at = Set(Some(now));
            active.last_updated = Set(now);
            active.update(db).await.map_err(ServiceError::DatabaseError)?;

            if let Some(event_sender) = &self.event_sender {
                if let Err(e) = event_sender
                    .send(Event::CartRecovered {
                        cart_id,
                        user_id: user_id.to_string(),
                    })
                    .await
                {
                    warn!(error = %e, cart_id = %cart_id, "Failed to send cart recovered event");
                }
            }
        }

        let deleted = AbandonedCartEntity::delete_many()
            .filter(abandoned_cart::Column::UserId.eq(user_id))
            .exec(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if recovered > 0 || deleted.rows_affected > 0 {
            info!(
                user_id = %user_id,
                recovered,
                deleted = deleted.rows_affected,
                "Abandoned carts reconciled"
            );
        }

        Ok(recovered)
    }
}

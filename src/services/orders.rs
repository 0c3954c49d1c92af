use crate::{
    db::DbPool,
    dto::PaymentItem,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, ActiveModel as OrderActiveModel, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Request/Response types for the order service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub user_email: String,
    pub items: Vec<PaymentItem>,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub checkout_session_id: String,
    pub status: OrderStatus,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: String,
    pub user_email: String,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub checkout_session_id: String,
    pub tracking_number: Option<String>,
    pub estimated_delivery_date: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Service for managing orders, the durable record of paid checkouts.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates an order and its line items in one transaction. The primary
    /// key is generated here, never taken from the payment provider.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, session_id = %request.checkout_session_id))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::OrderError(
                "an order requires at least one item".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let metadata = request
            .metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_active_model = OrderActiveModel {
            id: Set(order_id),
            user_id: Set(request.user_id.clone()),
            user_email: Set(request.user_email.clone()),
            status: Set(request.status),
            total_amount: Set(request.total_amount),
            currency: Set(request.currency.clone()),
            payment_method: Set(request.payment_method.clone()),
            checkout_session_id: Set(request.checkout_session_id.clone()),
            tracking_number: Set(None),
            estimated_delivery_date: Set(None),
            metadata: Set(metadata),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let order_model = order_active_model.insert(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order in database");
            ServiceError::DatabaseError(e)
        })?;

        let mut item_models = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let item_model = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.id.clone()),
                name: Set(item.name.clone()),
                unit_price: Set(item.price),
                quantity: Set(item.quantity),
                description: Set(item.description.clone()),
                image_url: Set(item.image_url.clone()),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to create order item");
                ServiceError::DatabaseError(e)
            })?;
            item_models.push(item_model);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, user_id = %request.user_id, "Order created successfully");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::OrderCreated(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send order created event");
            }
        }

        Ok(Self::model_to_response(order_model, item_models))
    }

    /// Retrieves an order by ID, with its items.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        match order {
            Some(order_model) => {
                let items = self.items_of(order_id).await?;
                Ok(Some(Self::model_to_response(order_model, items)))
            }
            None => Ok(None),
        }
    }

    /// Looks up an order by the provider's checkout session id. Used for
    /// webhook idempotency: a hit means this session was already fulfilled.
    #[instrument(skip(self))]
    pub async fn find_by_checkout_session(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find()
            .filter(order::Column::CheckoutSessionId.eq(checkout_session_id))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        match order {
            Some(order_model) => {
                let items = self.items_of(order_model.id).await?;
                Ok(Some(Self::model_to_response(order_model, items)))
            }
            None => Ok(None),
        }
    }

    /// Lists a user's orders, most recent first.
    #[instrument(skip(self))]
    pub async fn get_orders_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut responses = Vec::with_capacity(orders.len());
        for order_model in orders {
            let items = self.items_of(order_model.id).await?;
            responses.push(Self::model_to_response(order_model, items));
        }

        Ok(responses)
    }

    /// Updates an order's status.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                warn!(order_id = %order_id, "Order not found for status update");
                ServiceError::NotFound(format!("Order {order_id} not found"))
            })?;

        let old_status = order.status;

        let mut order_active_model: OrderActiveModel = order.into();
        order_active_model.status = Set(new_status);
        order_active_model.updated_at = Set(now);

        let updated_order = order_active_model.update(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update order status");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, ?old_status, ?new_status, "Order status updated");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::OrderStatusChanged {
                    order_id,
                    old_status: format!("{old_status:?}"),
                    new_status: format!("{new_status:?}"),
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "Failed to send order status changed event");
            }
        }

        let items = self.items_of(order_id).await?;
        Ok(Self::model_to_response(updated_order, items))
    }

    /// Records shipping information for an order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn update_tracking_info(
        &self,
        order_id: Uuid,
        tracking_number: String,
        estimated_delivery_date: Option<DateTime<Utc>>,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let mut order_active_model: OrderActiveModel = order.into();
        order_active_model.tracking_number = Set(Some(tracking_number));
        if estimated_delivery_date.is_some() {
            order_active_model.estimated_delivery_date = Set(estimated_delivery_date);
        }
        order_active_model.updated_at = Set(now);

        let updated_order = order_active_model.update(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update tracking info");
            ServiceError::DatabaseError(e)
        })?;

        let items = self.items_of(order_id).await?;
        Ok(Self::model_to_response(updated_order, items))
    }

    async fn items_of(&self, order_id: Uuid) -> Result<Vec<OrderItemModel>, ServiceError> {
        let db = &*self.db_pool;
        OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    fn model_to_response(model: OrderModel, items: Vec<OrderItemModel>) -> OrderResponse {
        OrderResponse {
            id: model.id,
            user_id: model.user_id,
            user_email: model.user_email,
            status: model.status,
            total_amount: model.total_amount,
            currency: model.currency,
            payment_method: model.payment_method,
            checkout_session_id: model.checkout_session_id,
            tracking_number: model.tracking_number,
            estimated_delivery_date: model.estimated_delivery_date,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    id: item.id,
                    product_id: item.product_id,
                    name: item.name,
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                    description: item.description,
                    image_url: item.image_url,
                })
                .collect(),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn model_to_response_carries_all_fields() {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let model = OrderModel {
            id: order_id,
            user_id: "u1".into(),
            user_email: "customer@example.com".into(),
            status: OrderStatus::Paid,
            total_amount: dec!(44.98),
            currency: "eur".into(),
            payment_method: "card".into(),
            checkout_session_id: "cs_test_1".into(),
            tracking_number: None,
            estimated_delivery_date: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        };
        let items = vec![OrderItemModel {
            id: Uuid::new_v4(),
            order_id,
            product_id: "p1".into(),
            name: "Ceramic mug".into(),
            unit_price: dec!(22.49),
            quantity: 2,
            description: None,
            image_url: None,
        }];

        let response = OrderService::model_to_response(model, items);

        assert_eq!(response.id, order_id);
        assert_eq!(response.status, OrderStatus::Paid);
        assert_eq!(response.total_amount, dec!(44.98));
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].product_id, "p1");
    }
}

//! Customer and operator notifications.
//!
//! One capability interface, multiple providers tried in order: the stack
//! walks its notifiers until one reports success. When no channel is
//! configured the pipeline skips notification entirely; the customer may
//! still be notified through a client-initiated channel after redirect.

use crate::config::AppConfig;
use crate::services::orders::OrderResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const DEFAULT_RESEND_API_BASE: &str = "https://api.resend.com";

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("channel is not configured")]
    NotConfigured,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected the message: HTTP {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delivery receipt from a notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub message_id: Option<String>,
}

/// A notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether credentials are present for this channel. Callers skip
    /// rather than fail when nothing is configured.
    fn is_configured(&self) -> bool;

    async fn send_order_confirmation(
        &self,
        order: &OrderResponse,
    ) -> Result<NotificationReceipt, NotificationError>;

    async fn send_operator_alert(
        &self,
        order: &OrderResponse,
    ) -> Result<NotificationReceipt, NotificationError>;
}

/// Transactional-email channel backed by the Resend API.
#[derive(Clone)]
pub struct ResendNotifier {
    http: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
    from: String,
    operator_email: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    html: String,
}

#[derive(Debug, Deserialize)]
struct EmailResponse {
    #[serde(default)]
    id: Option<String>,
}

impl ResendNotifier {
    pub fn new(cfg: &AppConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: cfg.resend_api_key.clone(),
            api_base: cfg
                .resend_api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_RESEND_API_BASE.to_string()),
            from: cfg.email_from.clone(),
            operator_email: cfg.operator_email.clone(),
        }
    }

    async fn send_email(
        &self,
        to: &str,
        subject: String,
        html: String,
    ) -> Result<NotificationReceipt, NotificationError> {
        let api_key = self.api_key.as_ref().ok_or(NotificationError::NotConfigured)?;

        let request = EmailRequest {
            from: &self.from,
            to: vec![to],
            subject,
            html,
        };

        let response = self
            .http
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(NotificationError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmailResponse = serde_json::from_str(&body).unwrap_or(EmailResponse { id: None });
        Ok(NotificationReceipt {
            message_id: parsed.id,
        })
    }

    fn confirmation_subject(order: &OrderResponse) -> String {
        format!("Order confirmation {}", order.id)
    }

    fn confirmation_body(order: &OrderResponse) -> String {
        let mut rows = String::new();
        for item in &order.items {
            rows.push_str(&format!(
                "<li>{} &times; {} — {} {}</li>",
                item.name, item.quantity, item.unit_price, order.currency
            ));
        }
        format!(
            "<h1>Thank you for your order</h1>\
             <p>Order <strong>{}</strong> is confirmed.</p>\
             <ul>{}</ul>\
             <p>Total: <strong>{} {}</strong></p>",
            order.id, rows, order.total_amount, order.currency
        )
    }

    fn alert_body(order: &OrderResponse) -> String {
        format!(
            "<p>New paid order <strong>{}</strong> from {} for {} {} ({} items).</p>",
            order.id,
            order.user_email,
            order.total_amount,
            order.currency,
            order.items.len()
        )
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    fn name(&self) -> &'static str {
        "resend"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn send_order_confirmation(
        &self,
        order: &OrderResponse,
    ) -> Result<NotificationReceipt, NotificationError> {
        self.send_email(
            &order.user_email,
            Self::confirmation_subject(order),
            Self::confirmation_body(order),
        )
        .await
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn send_operator_alert(
        &self,
        order: &OrderResponse,
    ) -> Result<NotificationReceipt, NotificationError> {
        let operator = self
            .operator_email
            .as_ref()
            .ok_or(NotificationError::NotConfigured)?
            .clone();
        self.send_email(
            &operator,
            format!("New order {}", order.id),
            Self::alert_body(order),
        )
        .await
    }
}

/// Inert channel: always unconfigured, never sends.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn send_order_confirmation(
        &self,
        _order: &OrderResponse,
    ) -> Result<NotificationReceipt, NotificationError> {
        Err(NotificationError::NotConfigured)
    }

    async fn send_operator_alert(
        &self,
        _order: &OrderResponse,
    ) -> Result<NotificationReceipt, NotificationError> {
        Err(NotificationError::NotConfigured)
    }
}

/// Ordered list of channels, tried in sequence until one succeeds.
pub struct NotifierStack {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierStack {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    /// True when at least one channel has credentials.
    pub fn is_configured(&self) -> bool {
        self.notifiers.iter().any(|n| n.is_configured())
    }

    pub async fn send_order_confirmation(
        &self,
        order: &OrderResponse,
    ) -> Result<NotificationReceipt, NotificationError> {
        self.try_each(order, |notifier, order| {
            Box::pin(notifier.send_order_confirmation(order))
        })
        .await
    }

    pub async fn send_operator_alert(
        &self,
        order: &OrderResponse,
    ) -> Result<NotificationReceipt, NotificationError> {
        self.try_each(order, |notifier, order| {
            Box::pin(notifier.send_operator_alert(order))
        })
        .await
    }

    async fn try_each<'a, F>(
        &'a self,
        order: &'a OrderResponse,
        send: F,
    ) -> Result<NotificationReceipt, NotificationError>
    where
        F: Fn(
            &'a dyn Notifier,
            &'a OrderResponse,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<NotificationReceipt, NotificationError>> + Send + 'a>,
        >,
    {
        let mut last_error = NotificationError::NotConfigured;

        for notifier in &self.notifiers {
            if !notifier.is_configured() {
                debug!(channel = notifier.name(), "Skipping unconfigured channel");
                continue;
            }
            match send(notifier.as_ref(), order).await {
                Ok(receipt) => {
                    info!(channel = notifier.name(), "Notification delivered");
                    return Ok(receipt);
                }
                Err(e) => {
                    warn!(channel = notifier.name(), error = %e, "Channel failed, trying next");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

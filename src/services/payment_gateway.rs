//! Hosted-checkout adapter for the payment provider (Stripe).
//!
//! The HTTP client is injected at construction time and reused for every
//! call; the API base is overridable so tests can point the gateway at a
//! local mock server.

use crate::config::AppConfig;
use crate::dto::{CheckoutSessionDetails, FulfillmentContext, PaymentItem, PaymentSessionRequest, PaymentStatus};
use crate::errors::ServiceError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Provider-facing settings, extracted from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
    pub currency: String,
    pub public_base_url: Option<String>,
}

impl From<&AppConfig> for StripeConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            secret_key: cfg.stripe_secret_key.clone(),
            api_base: cfg
                .stripe_api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            currency: cfg.checkout_currency.clone(),
            public_base_url: cfg.public_base_url.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorEnvelope {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Adapter over the provider's checkout-session and payment-intent APIs.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeGateway {
    pub fn new(config: StripeConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    /// Creates a hosted checkout session and returns its id and redirect URL.
    #[instrument(skip(self, request, context), fields(user_id = %request.user_id, items = request.items.len()))]
    pub async fn create_checkout_session(
        &self,
        request: &PaymentSessionRequest,
        context: &FulfillmentContext,
    ) -> Result<CheckoutSessionDetails, ServiceError> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            ("customer_email".into(), request.user_email.clone()),
        ];

        for (index, item) in request.items.iter().enumerate() {
            self.push_line_item(&mut params, index, item)?;
        }

        let metadata = context.to_metadata(&request.metadata)?;
        for (key, value) in &metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.config.api_base))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("checkout session request failed: {e}")))?;

        let session: SessionResponse = Self::decode(response).await?;
        let url = session.url.ok_or_else(|| ServiceError::PaymentService {
            code: None,
            kind: None,
            message: "provider returned a session without a redirect URL".into(),
        })?;

        info!(session_id = %session.id, "Checkout session created");

        Ok(CheckoutSessionDetails {
            session_id: session.id,
            url,
        })
    }

    /// Looks up a checkout session and reports its payment state.
    #[instrument(skip(self))]
    pub async fn verify_status(&self, session_id: &str) -> Result<PaymentStatus, ServiceError> {
        let session = self.retrieve_session(session_id).await?;
        Ok(Self::session_status(&session))
    }

    /// Status lookup tolerant of the caller holding either a checkout-session
    /// id or a lower-level payment-intent id: tries the session
    /// representation first and falls back to the intent one, failing only
    /// when both lookups miss.
    #[instrument(skip(self))]
    pub async fn fetch_legacy_status(&self, id: &str) -> Result<PaymentStatus, ServiceError> {
        match self.retrieve_session(id).await {
            Ok(session) => Ok(Self::session_status(&session)),
            Err(err) if Self::is_missing_resource(&err) => {
                debug!(%id, "No checkout session under this id, trying payment intent");
                match self.retrieve_payment_intent(id).await {
                    Ok(intent) => Ok(Self::intent_status(&intent)),
                    Err(err) if Self::is_missing_resource(&err) => Err(ServiceError::NotFound(
                        format!("no checkout session or payment intent with id {id}"),
                    )),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionResponse, ServiceError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/checkout/sessions/{session_id}",
                self.config.api_base
            ))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("session lookup failed: {e}")))?;

        Self::decode(response).await
    }

    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntentResponse, ServiceError> {
        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{id}", self.config.api_base))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("payment intent lookup failed: {e}"))
            })?;

        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("provider response unreadable: {e}"))
        })?;

        if !status.is_success() {
            let envelope: Option<ProviderErrorEnvelope> = serde_json::from_str(&body).ok();
            let (code, kind, message) = match envelope {
                Some(env) => (
                    env.error.code,
                    env.error.kind,
                    env.error
                        .message
                        .unwrap_or_else(|| format!("provider returned HTTP {status}")),
                ),
                None => (None, None, format!("provider returned HTTP {status}")),
            };
            warn!(%status, code = ?code, "Payment provider call rejected");
            return Err(ServiceError::PaymentService { code, kind, message });
        }

        serde_json::from_str(&body).map_err(|e| {
            ServiceError::PaymentService {
                code: None,
                kind: None,
                message: format!("provider response could not be decoded: {e}"),
            }
        })
    }

    fn session_status(session: &SessionResponse) -> PaymentStatus {
        match session.payment_status.as_deref() {
            Some("paid") => PaymentStatus::Paid,
            _ => match session.status.as_deref() {
                Some("expired") => PaymentStatus::Failed,
                _ => PaymentStatus::Pending,
            },
        }
    }

    fn intent_status(intent: &PaymentIntentResponse) -> PaymentStatus {
        match intent.status.as_deref() {
            Some("succeeded") => PaymentStatus::Paid,
            Some("canceled") => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }

    fn is_missing_resource(err: &ServiceError) -> bool {
        matches!(
            err,
            ServiceError::PaymentService { code: Some(code), .. } if code == "resource_missing"
        )
    }

    fn push_line_item(
        &self,
        params: &mut Vec<(String, String)>,
        index: usize,
        item: &PaymentItem,
    ) -> Result<(), ServiceError> {
        let prefix = format!("line_items[{index}]");
        params.push((
            format!("{prefix}[price_data][currency]"),
            self.config.currency.clone(),
        ));
        params.push((
            format!("{prefix}[price_data][unit_amount]"),
            to_minor_units(item.price)?.to_string(),
        ));
        params.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        if let Some(description) = item
            .description
            .as_ref()
            .filter(|d| !d.trim().is_empty())
        {
            params.push((
                format!("{prefix}[price_data][product_data][description]"),
                description.clone(),
            ));
        }
        // A broken image reference must never abort checkout.
        if let Some(image) = item
            .image_url
            .as_deref()
            .and_then(|raw| self.normalize_image_url(raw))
        {
            params.push((
                format!("{prefix}[price_data][product_data][images][0]"),
                image,
            ));
        }
        params.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        Ok(())
    }

    /// Returns an absolute http(s) form of `raw`, joining relative paths
    /// onto the storefront's public base URL; `None` when no absolute form
    /// can be produced.
    fn normalize_image_url(&self, raw: &str) -> Option<String> {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url.to_string()),
            Ok(_) => {
                debug!(%raw, "Dropping image with non-http scheme");
                None
            }
            Err(_) => {
                let base = self.config.public_base_url.as_deref()?;
                match Url::parse(base).and_then(|b| b.join(raw)) {
                    Ok(url) => Some(url.to_string()),
                    Err(_) => {
                        debug!(%raw, "Dropping unparseable image URL");
                        None
                    }
                }
            }
        }
    }
}

/// Converts a decimal major-unit price into the provider's integer minor
/// units (two-decimal currencies).
pub fn to_minor_units(price: Decimal) -> Result<i64, ServiceError> {
    let minor = (price * Decimal::from(100)).round();
    minor.to_i64().ok_or_else(|| {
        ServiceError::InvalidOperation(format!("price {price} does not fit in minor units"))
    })
}

/// Converts the provider's integer minor units back to a decimal amount.
pub fn from_minor_units(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server_uri: &str) -> StripeGateway {
        let config = StripeConfig {
            secret_key: "sk_test_xxx".into(),
            api_base: server_uri.trim_end_matches('/').to_string(),
            currency: "eur".into(),
            public_base_url: Some("https://shop.example.com".into()),
        };
        StripeGateway::new(config, reqwest::Client::new())
    }

    fn request() -> PaymentSessionRequest {
        PaymentSessionRequest {
            items: vec![PaymentItem {
                id: "prod_1".into(),
                name: "Ceramic mug".into(),
                price: dec!(19.99),
                quantity: 2,
                description: Some("Hand glazed".into()),
                image_url: Some("/images/mug.png".into()),
            }],
            user_id: "u1".into(),
            user_email: "customer@example.com".into(),
            success_url: "https://shop.example.com/success".into(),
            cancel_url: "https://shop.example.com/cancel".into(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn minor_unit_conversion_round_trips() {
        assert_eq!(to_minor_units(dec!(1200.00)).unwrap(), 120_000);
        assert_eq!(to_minor_units(dec!(19.99)).unwrap(), 1999);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(from_minor_units(120_000), dec!(1200.00));
        assert_eq!(from_minor_units(1999), dec!(19.99));
    }

    #[test]
    fn image_urls_are_normalized_or_dropped() {
        let gateway = gateway_for("https://api.stripe.example");
        assert_eq!(
            gateway.normalize_image_url("https://cdn.example.com/mug.png"),
            Some("https://cdn.example.com/mug.png".into())
        );
        assert_eq!(
            gateway.normalize_image_url("/images/mug.png"),
            Some("https://shop.example.com/images/mug.png".into())
        );
        assert_eq!(gateway.normalize_image_url("ftp://cdn.example.com/mug.png"), None);

        let no_base = StripeGateway::new(
            StripeConfig {
                secret_key: "sk".into(),
                api_base: "https://api.stripe.example".into(),
                currency: "eur".into(),
                public_base_url: None,
            },
            reqwest::Client::new(),
        );
        assert_eq!(no_base.normalize_image_url("/images/mug.png"), None);
    }

    #[tokio::test]
    async fn create_checkout_session_maps_items_and_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(body_string_contains("line_items%5B0%5D%5Bprice_data%5D%5Bunit_amount%5D=1999"))
            .and(body_string_contains("metadata%5Buser_id%5D=u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_123",
                "url": "https://checkout.stripe.com/c/pay/cs_test_123"
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server.uri());
        let req = request();
        let ctx = FulfillmentContext::new(&req);
        let details = gateway.create_checkout_session(&req, &ctx).await.unwrap();

        assert_eq!(details.session_id, "cs_test_123");
        assert!(details.url.contains("cs_test_123"));
    }

    #[tokio::test]
    async fn provider_rejection_carries_code_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {
                    "code": "parameter_invalid_empty",
                    "type": "invalid_request_error",
                    "message": "line_items[0][price_data][product_data][name] must not be empty"
                }
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server.uri());
        let req = request();
        let ctx = FulfillmentContext::new(&req);
        let err = gateway.create_checkout_session(&req, &ctx).await.unwrap_err();

        match err {
            ServiceError::PaymentService { code, kind, .. } => {
                assert_eq!(code.as_deref(), Some("parameter_invalid_empty"));
                assert_eq!(kind.as_deref(), Some("invalid_request_error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn verify_status_maps_payment_states() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_paid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_paid", "status": "complete", "payment_status": "paid"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_open", "status": "open", "payment_status": "unpaid"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_expired"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_expired", "status": "expired", "payment_status": "unpaid"
            })))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server.uri());
        assert_eq!(gateway.verify_status("cs_paid").await.unwrap(), PaymentStatus::Paid);
        assert_eq!(gateway.verify_status("cs_open").await.unwrap(), PaymentStatus::Pending);
        assert_eq!(gateway.verify_status("cs_expired").await.unwrap(), PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn legacy_status_falls_back_to_payment_intent() {
        let server = MockServer::start().await;
        let missing = serde_json::json!({
            "error": { "code": "resource_missing", "type": "invalid_request_error",
                       "message": "No such checkout session" }
        });
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/pi_123"))
            .respond_with(ResponseTemplate::new(404).set_body_json(missing.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_123", "status": "succeeded"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_json(missing.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_json(missing))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server.uri());
        assert_eq!(
            gateway.fetch_legacy_status("pi_123").await.unwrap(),
            PaymentStatus::Paid
        );
        assert!(matches!(
            gateway.fetch_legacy_status("nope").await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }
}

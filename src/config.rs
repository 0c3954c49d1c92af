use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_EMAIL_FROM: &str = "Storefront <orders@storefront.local>";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_HTTP_CLIENT_TIMEOUT_SECS: u64 = 15;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Timeout applied to every outbound HTTP call (provider, notifier)
    #[serde(default = "default_http_client_timeout_secs")]
    pub http_client_timeout_secs: u64,

    /// Payment provider API secret key
    #[validate(length(min = 1, message = "Stripe secret key must not be empty"))]
    pub stripe_secret_key: String,

    /// Override for the payment provider API base URL (tests, proxies)
    #[serde(default)]
    pub stripe_api_base: Option<String>,

    /// Shared secret for webhook signature verification; verification is
    /// skipped when unset (local development only)
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Allowed clock skew for webhook timestamps (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub payment_webhook_tolerance_secs: u64,

    /// Settlement currency for hosted checkout sessions (ISO 4217, lowercase)
    #[serde(default = "default_checkout_currency")]
    pub checkout_currency: String,

    /// Public base URL of the storefront, used to absolutize relative
    /// catalog image paths
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Transactional email provider API key; the email channel reports
    /// unconfigured when unset
    #[serde(default)]
    pub resend_api_key: Option<String>,

    /// Override for the email provider API base URL (tests)
    #[serde(default)]
    pub resend_api_base: Option<String>,

    /// From-address for customer notifications
    #[serde(default = "default_email_from")]
    pub email_from: String,

    /// Recipient of operator alerts; alerts are skipped when unset
    #[serde(default)]
    pub operator_email: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_http_client_timeout_secs() -> u64 {
    DEFAULT_HTTP_CLIENT_TIMEOUT_SECS
}
fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_email_from() -> String {
    DEFAULT_EMAIL_FROM.to_string()
}
fn default_checkout_currency() -> String {
    "eur".to_string()
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn new(
        database_url: impl Into<String>,
        stripe_secret_key: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            host: host.into(),
            port,
            environment: environment.into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            http_client_timeout_secs: default_http_client_timeout_secs(),
            stripe_secret_key: stripe_secret_key.into(),
            stripe_api_base: None,
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            checkout_currency: default_checkout_currency(),
            public_base_url: None,
            resend_api_key: None,
            resend_api_base: None,
            email_from: default_email_from(),
            operator_email: None,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment.as_str(), "development" | "test")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Constraints that cut across fields and environments.
    pub fn validate_additional_constraints(&self) -> Result<(), String> {
        if !self.is_development()
            && self.cors_allowed_origins.is_none()
            && !self.cors_allow_any_origin
        {
            return Err(
                "CORS origins must be configured outside development: set \
                 APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
                    .to_string(),
            );
        }
        if self.db_min_connections > self.db_max_connections {
            return Err("db_min_connections must not exceed db_max_connections".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // NOTE: stripe_secret_key has no default - it MUST be provided via
    // environment variable or config file.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://fulfillment.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("stripe_secret_key").is_err() {
        error!("Payment provider key is not configured. Set APP__STRIPE_SECRET_KEY.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "stripe_secret_key is required but not configured. Set APP__STRIPE_SECRET_KEY."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e.to_string())
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(environment: &str) -> AppConfig {
        AppConfig::new(
            "sqlite::memory:",
            "sk_test_xxx",
            "127.0.0.1",
            8080,
            environment,
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config("production");
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_allows_override_flag() {
        let mut cfg = base_config("production");
        cfg.cors_allow_any_origin = true;
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config("production");
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn development_is_permissive() {
        let cfg = base_config("development");
        assert!(cfg.should_allow_permissive_cors());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn pool_bounds_are_checked() {
        let mut cfg = base_config("development");
        cfg.db_min_connections = 20;
        cfg.db_max_connections = 5;
        assert!(cfg.validate_additional_constraints().is_err());
    }
}

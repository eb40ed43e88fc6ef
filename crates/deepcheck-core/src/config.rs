//! Configuration module
//!
//! Configuration is read once from the environment (`.env` files are honored through
//! `dotenvy`). Optional integrations (payment gateway, detector, identity provider) stay
//! `None` when unset and fail at the point of use with a configuration error.

use std::env;

use crate::constants::{DEFAULT_CURRENCY, DEFAULT_DEMO_TOKEN_FLOOR};

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";

/// Base configuration shared by every binary
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub log_format: String,
}

/// Identity provider settings. Tokens are verified either with a shared HS256 secret or
/// against the provider's JWKS endpoint.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub jwks_url: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub base: BaseConfig,
    pub database_url: String,
    pub auth: AuthConfig,
    // Payment gateway
    pub paystack_secret_key: Option<String>,
    pub paystack_webhook_secret: Option<String>,
    pub paystack_base_url: String,
    pub payment_callback_url: Option<String>,
    pub default_currency: String,
    // Detector
    pub detection_api_url: Option<String>,
    pub detection_api_key: Option<String>,
    pub detection_timeout_seconds: u64,
    // Tokens
    pub demo_account_emails: Vec<String>,
    pub demo_token_floor: i64,
    // Uploads
    pub max_image_size_bytes: usize,
    pub max_video_size_bytes: usize,
    pub upload_retention_hours: i64,
    pub upload_sweep_interval_secs: u64,
    // Detection queue
    pub detection_queue_max_workers: usize,
    pub detection_queue_poll_interval_ms: u64,
    pub detection_queue_max_retries: i32,
    pub detection_queue_timeout_seconds: i32,
    /// Interval in seconds between stale job reaper runs. 0 = disabled.
    pub detection_queue_stale_reap_interval_secs: u64,
    pub detection_queue_stale_grace_period_secs: i64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<ServiceConfig>);

impl Config {
    fn inner(&self) -> &ServiceConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        is_production_env(&self.inner().base.environment)
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = ServiceConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn log_format(&self) -> &str {
        &self.inner().base.log_format
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.inner().auth
    }

    pub fn paystack_secret_key(&self) -> Option<&str> {
        self.inner().paystack_secret_key.as_deref()
    }

    /// Secret used to sign webhooks. Paystack signs with the account secret key unless a
    /// dedicated secret is configured.
    pub fn paystack_webhook_secret(&self) -> Option<&str> {
        self.inner()
            .paystack_webhook_secret
            .as_deref()
            .or(self.inner().paystack_secret_key.as_deref())
    }

    pub fn paystack_base_url(&self) -> &str {
        &self.inner().paystack_base_url
    }

    pub fn payment_callback_url(&self) -> Option<&str> {
        self.inner().payment_callback_url.as_deref()
    }

    pub fn default_currency(&self) -> &str {
        &self.inner().default_currency
    }

    pub fn detection_api_url(&self) -> Option<&str> {
        self.inner().detection_api_url.as_deref()
    }

    pub fn detection_api_key(&self) -> Option<&str> {
        self.inner().detection_api_key.as_deref()
    }

    pub fn detection_timeout_seconds(&self) -> u64 {
        self.inner().detection_timeout_seconds
    }

    pub fn demo_account_emails(&self) -> &[String] {
        &self.inner().demo_account_emails
    }

    pub fn demo_token_floor(&self) -> i64 {
        self.inner().demo_token_floor
    }

    pub fn max_image_size_bytes(&self) -> usize {
        self.inner().max_image_size_bytes
    }

    pub fn max_video_size_bytes(&self) -> usize {
        self.inner().max_video_size_bytes
    }

    pub fn upload_retention_hours(&self) -> i64 {
        self.inner().upload_retention_hours
    }

    pub fn upload_sweep_interval_secs(&self) -> u64 {
        self.inner().upload_sweep_interval_secs
    }

    pub fn detection_queue_max_workers(&self) -> usize {
        self.inner().detection_queue_max_workers
    }

    pub fn detection_queue_poll_interval_ms(&self) -> u64 {
        self.inner().detection_queue_poll_interval_ms
    }

    pub fn detection_queue_max_retries(&self) -> i32 {
        self.inner().detection_queue_max_retries
    }

    pub fn detection_queue_timeout_seconds(&self) -> i32 {
        self.inner().detection_queue_timeout_seconds
    }

    pub fn detection_queue_stale_reap_interval_secs(&self) -> u64 {
        self.inner().detection_queue_stale_reap_interval_secs
    }

    pub fn detection_queue_stale_grace_period_secs(&self) -> i64 {
        self.inner().detection_queue_stale_grace_period_secs
    }
}

fn is_production_env(environment: &str) -> bool {
    let environment = environment.to_lowercase();
    environment == "production" || environment == "prod"
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var<T: std::str::FromStr + ToString>(key: &str, default: T) -> T {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const MAX_IMAGE_SIZE_MB: usize = 10;
        const MAX_VIDEO_SIZE_MB: usize = 50;
        const DETECTION_TIMEOUT_SECS: u64 = 60;
        const UPLOAD_RETENTION_HOURS: i64 = 24;
        const UPLOAD_SWEEP_INTERVAL_SECS: u64 = 600;
        const QUEUE_MAX_WORKERS: usize = 4;
        const QUEUE_POLL_INTERVAL_MS: u64 = 1000;
        const QUEUE_MAX_RETRIES: i32 = 3;
        const QUEUE_TIMEOUT_SECS: i32 = 120;
        const STALE_REAP_INTERVAL_SECS: u64 = 60;
        const STALE_GRACE_PERIOD_SECS: i64 = 60;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        if is_production_env(&environment) && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: parsed_var("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: parsed_var("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            environment,
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        };

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let demo_account_emails = env::var("DEMO_ACCOUNT_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let config = ServiceConfig {
            base,
            database_url,
            auth: AuthConfig {
                jwt_secret: optional_var("AUTH_JWT_SECRET"),
                jwks_url: optional_var("AUTH_JWKS_URL"),
                issuer: optional_var("AUTH_ISSUER"),
                audience: optional_var("AUTH_AUDIENCE"),
            },
            paystack_secret_key: optional_var("PAYSTACK_SECRET_KEY"),
            paystack_webhook_secret: optional_var("PAYSTACK_WEBHOOK_SECRET"),
            paystack_base_url: env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PAYSTACK_BASE_URL.to_string()),
            payment_callback_url: optional_var("PAYMENT_CALLBACK_URL"),
            default_currency: env::var("DEFAULT_CURRENCY")
                .unwrap_or_else(|_| DEFAULT_CURRENCY.to_string())
                .to_uppercase(),
            detection_api_url: optional_var("DETECTION_API_URL"),
            detection_api_key: optional_var("DETECTION_API_KEY"),
            detection_timeout_seconds: parsed_var(
                "DETECTION_TIMEOUT_SECONDS",
                DETECTION_TIMEOUT_SECS,
            ),
            demo_account_emails,
            demo_token_floor: parsed_var("DEMO_TOKEN_FLOOR", DEFAULT_DEMO_TOKEN_FLOOR),
            max_image_size_bytes: parsed_var("MAX_IMAGE_SIZE_MB", MAX_IMAGE_SIZE_MB) * 1024 * 1024,
            max_video_size_bytes: parsed_var("MAX_VIDEO_SIZE_MB", MAX_VIDEO_SIZE_MB) * 1024 * 1024,
            upload_retention_hours: parsed_var("UPLOAD_RETENTION_HOURS", UPLOAD_RETENTION_HOURS),
            upload_sweep_interval_secs: parsed_var(
                "UPLOAD_SWEEP_INTERVAL_SECS",
                UPLOAD_SWEEP_INTERVAL_SECS,
            ),
            detection_queue_max_workers: parsed_var(
                "DETECTION_QUEUE_MAX_WORKERS",
                QUEUE_MAX_WORKERS,
            ),
            detection_queue_poll_interval_ms: parsed_var(
                "DETECTION_QUEUE_POLL_INTERVAL_MS",
                QUEUE_POLL_INTERVAL_MS,
            ),
            detection_queue_max_retries: parsed_var(
                "DETECTION_QUEUE_MAX_RETRIES",
                QUEUE_MAX_RETRIES,
            ),
            detection_queue_timeout_seconds: parsed_var(
                "DETECTION_QUEUE_TIMEOUT_SECONDS",
                QUEUE_TIMEOUT_SECS,
            ),
            detection_queue_stale_reap_interval_secs: parsed_var(
                "DETECTION_QUEUE_STALE_REAP_INTERVAL_SECS",
                STALE_REAP_INTERVAL_SECS,
            ),
            detection_queue_stale_grace_period_secs: parsed_var(
                "DETECTION_QUEUE_STALE_GRACE_PERIOD_SECS",
                STALE_GRACE_PERIOD_SECS,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if let Some(ref secret) = self.auth.jwt_secret {
            if secret.len() < 32 {
                return Err(anyhow::anyhow!(
                    "AUTH_JWT_SECRET must be at least 32 characters long"
                ));
            }
        }

        if self.auth.jwt_secret.is_none() && self.auth.jwks_url.is_none() {
            return Err(anyhow::anyhow!(
                "Either AUTH_JWT_SECRET or AUTH_JWKS_URL must be set"
            ));
        }

        if self.demo_token_floor < 0 {
            return Err(anyhow::anyhow!("DEMO_TOKEN_FLOOR must not be negative"));
        }

        if self.detection_queue_max_workers == 0 {
            return Err(anyhow::anyhow!(
                "DETECTION_QUEUE_MAX_WORKERS must be at least 1"
            ));
        }

        // Unsigned webhooks are only tolerated outside production.
        if is_production_env(&self.base.environment)
            && self.paystack_webhook_secret.is_none()
            && self.paystack_secret_key.is_none()
        {
            return Err(anyhow::anyhow!(
                "PAYSTACK_WEBHOOK_SECRET or PAYSTACK_SECRET_KEY must be set in production"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ServiceConfig {
        ServiceConfig {
            base: BaseConfig {
                server_port: 4000,
                cors_origins: vec!["*".to_string()],
                db_max_connections: 5,
                db_timeout_seconds: 5,
                environment: "development".to_string(),
                log_format: "text".to_string(),
            },
            database_url: "postgresql://localhost/deepcheck".to_string(),
            auth: AuthConfig {
                jwt_secret: Some("x".repeat(32)),
                ..Default::default()
            },
            paystack_secret_key: None,
            paystack_webhook_secret: None,
            paystack_base_url: DEFAULT_PAYSTACK_BASE_URL.to_string(),
            payment_callback_url: None,
            default_currency: "NGN".to_string(),
            detection_api_url: None,
            detection_api_key: None,
            detection_timeout_seconds: 10,
            demo_account_emails: vec![],
            demo_token_floor: 300,
            max_image_size_bytes: 10 * 1024 * 1024,
            max_video_size_bytes: 50 * 1024 * 1024,
            upload_retention_hours: 24,
            upload_sweep_interval_secs: 600,
            detection_queue_max_workers: 2,
            detection_queue_poll_interval_ms: 100,
            detection_queue_max_retries: 3,
            detection_queue_timeout_seconds: 30,
            detection_queue_stale_reap_interval_secs: 0,
            detection_queue_stale_grace_period_secs: 30,
        }
    }

    #[test]
    fn test_development_accepts_missing_webhook_secret() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_production_requires_webhook_secret() {
        let mut config = sample();
        config.base.environment = "production".to_string();
        assert!(config.validate().is_err());

        config.paystack_secret_key = Some("sk_live_x".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_short_jwt_secret() {
        let mut config = sample();
        config.auth.jwt_secret = Some("short".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_webhook_secret_falls_back_to_secret_key() {
        let mut inner = sample();
        inner.paystack_secret_key = Some("sk_test_abc".to_string());
        let config = Config(Box::new(inner));
        assert_eq!(config.paystack_webhook_secret(), Some("sk_test_abc"));
    }
}

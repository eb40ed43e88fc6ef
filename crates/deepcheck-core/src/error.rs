//! Error types module
//!
//! All request-path failures are unified under [`AppError`]. Each variant describes its own
//! HTTP presentation through [`ErrorMetadata`], so the API layer never matches on variants to
//! pick a status code.
//!
//! The `Database` variant carries the `sqlx` error when the `sqlx` feature is enabled.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors such as validation failures
    Debug,
    /// Recoverable issues and business-rule rejections
    Warn,
    /// Unexpected failures
    Error,
}

/// Metadata for error responses
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "INSUFFICIENT_TOKENS")
    fn error_code(&self) -> &'static str;

    /// Whether the request can be retried as-is
    fn is_recoverable(&self) -> bool;

    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from the internal message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Data integrity error: {0}")]
    Integrity(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient tokens: {available} available, {required} required")]
    InsufficientTokens { available: i64, required: i64 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Payment gateway not configured: {0}")]
    GatewayConfig(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidRequest(format!("UUID parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidRequest(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Integrity(_) => (
            500,
            "DATA_INTEGRITY_ERROR",
            false,
            Some("Contact support if this error persists"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidRequest(_) => (
            400,
            "INVALID_REQUEST",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Unauthorized(_) => (
            401,
            "UNAUTHORIZED",
            false,
            Some("Sign in and retry with a valid bearer token"),
            false,
            LogLevel::Debug,
        ),
        AppError::AccessDenied(_) => (
            403,
            "ACCESS_DENIED",
            false,
            Some("Use the account that owns this resource"),
            false,
            LogLevel::Warn,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::InsufficientTokens { .. } => (
            402,
            "INSUFFICIENT_TOKENS",
            false,
            Some("Purchase more tokens and retry"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidState(_) => (
            409,
            "INVALID_STATE",
            false,
            Some("Refresh the order and check its current status"),
            false,
            LogLevel::Debug,
        ),
        AppError::GatewayConfig(_) => (
            500,
            "PAYMENT_GATEWAY_MISCONFIGURED",
            false,
            Some("Contact support"),
            true,
            LogLevel::Error,
        ),
        AppError::Gateway(_) => (
            502,
            "PAYMENT_GATEWAY_ERROR",
            true,
            Some("Retry payment after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Integrity(_) => "Integrity",
            AppError::InvalidRequest(_) => "InvalidRequest",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::AccessDenied(_) => "AccessDenied",
            AppError::NotFound(_) => "NotFound",
            AppError::InsufficientTokens { .. } => "InsufficientTokens",
            AppError::InvalidState(_) => "InvalidState",
            AppError::GatewayConfig(_) => "GatewayConfig",
            AppError::Gateway(_) => "Gateway",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Structured data the client needs to recover, if any.
    pub fn context(&self) -> Option<serde_json::Value> {
        match self {
            AppError::InsufficientTokens {
                available,
                required,
            } => Some(serde_json::json!({
                "currentTokens": available,
                "requiredTokens": required,
            })),
            _ => None,
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Integrity(_) => "Stored data is inconsistent".to_string(),
            AppError::InvalidRequest(ref msg) => msg.clone(),
            AppError::Unauthorized(ref msg) => msg.clone(),
            AppError::AccessDenied(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::InsufficientTokens {
                available,
                required,
            } => format!(
                "Insufficient tokens: {} available, {} required",
                available, required
            ),
            AppError::InvalidState(ref msg) => msg.clone(),
            AppError::GatewayConfig(_) => "Payments are not available right now".to_string(),
            AppError::Gateway(_) => "Payment provider request failed".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.client_message(), "Failed to access database");
        assert!(err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_error_metadata_insufficient_tokens() {
        let err = AppError::InsufficientTokens {
            available: 0,
            required: 1,
        };
        assert_eq!(err.http_status_code(), 402);
        assert_eq!(err.error_code(), "INSUFFICIENT_TOKENS");
        assert!(!err.is_sensitive());
        let context = err.context().unwrap();
        assert_eq!(context["currentTokens"], 0);
        assert_eq!(context["requiredTokens"], 1);
    }

    #[test]
    fn test_error_metadata_gateway_is_opaque() {
        let err = AppError::Gateway("provider said: invalid key sk_live_123".to_string());
        assert_eq!(err.http_status_code(), 502);
        assert!(err.is_sensitive());
        assert!(!err.client_message().contains("sk_live"));

        let err = AppError::GatewayConfig("PAYSTACK_SECRET_KEY missing".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert!(!err.client_message().contains("PAYSTACK"));
    }

    #[test]
    fn test_error_metadata_authorization() {
        let unauthorized = AppError::Unauthorized("Missing bearer token".to_string());
        assert_eq!(unauthorized.http_status_code(), 401);

        let denied = AppError::AccessDenied("Order belongs to another user".to_string());
        assert_eq!(denied.http_status_code(), 403);
        assert_eq!(denied.error_code(), "ACCESS_DENIED");
        assert!(denied.context().is_none());
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let err = AppError::from(anyhow::anyhow!("inner").context("outer"));
        assert!(err.detailed_message().contains("outer"));
    }
}

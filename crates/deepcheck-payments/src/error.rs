//! Payment error types

use deepcheck_core::AppError;
use thiserror::Error;

pub type PaymentResult<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    /// The gateway cannot be used until it is configured (no secret key).
    #[error("Payment gateway not configured: {0}")]
    Config(String),

    #[error("Payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-2xx status or `status: false`.
    #[error("Payment gateway rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected payment gateway response: {0}")]
    InvalidResponse(String),

    #[error("Webhook payload invalid: {0}")]
    WebhookParse(String),
}

impl PaymentError {
    /// Transport failures and gateway 5xx responses may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Http(_) => true,
            PaymentError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Config(msg) => AppError::GatewayConfig(msg),
            PaymentError::WebhookParse(msg) => AppError::InvalidRequest(msg),
            other => AppError::Gateway(other.to_string()),
        }
    }
}

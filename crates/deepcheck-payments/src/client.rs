use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::error::{PaymentError, PaymentResult};
use crate::types::{
    ChargeStatus, InitializeTransaction, InitializedTransaction, PaymentPurpose,
    VerifiedTransaction,
};

pub const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";

/// Card payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> PaymentResult<InitializedTransaction>;

    async fn verify_reference(&self, reference: &str) -> PaymentResult<VerifiedTransaction>;
}

/// Paystack REST envelope: `{status, message, data}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: &'a Value,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: Option<String>,
    access_code: Option<String>,
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: Option<String>,
    amount: Option<i64>,
    #[serde(default)]
    metadata: Value,
}

pub struct PaystackClient {
    http_client: Client,
    secret_key: Option<String>,
    base_url: String,
}

impl Debug for PaystackClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PaystackClient")
            .field("base_url", &self.base_url)
            .field("configured", &self.secret_key.is_some())
            .finish()
    }
}

impl PaystackClient {
    /// A client without a secret key is valid; every call then fails with
    /// [`PaymentError::Config`].
    pub fn new(
        secret_key: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> PaymentResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http_client,
            secret_key: secret_key.filter(|key| !key.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    fn secret_key(&self) -> PaymentResult<&str> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| PaymentError::Config("PAYSTACK_SECRET_KEY is not set".to_string()))
    }

    async fn read_envelope<T: DeserializeOwned>(response: Response) -> PaymentResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Envelope<Value>>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        if !envelope.status {
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message: envelope
                    .message
                    .unwrap_or_else(|| "gateway returned status=false".to_string()),
            });
        }
        envelope
            .data
            .ok_or_else(|| PaymentError::InvalidResponse("response has no data".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    #[tracing::instrument(skip(self, request), fields(reference = %request.reference))]
    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> PaymentResult<InitializedTransaction> {
        let secret_key = self.secret_key()?;
        let body = InitializeBody {
            email: &request.email,
            amount: request.amount_cents,
            reference: &request.reference,
            currency: request.currency.as_deref(),
            callback_url: request.callback_url.as_deref(),
            metadata: &request.metadata,
        };

        let response = self
            .http_client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(secret_key)
            .json(&body)
            .send()
            .await?;

        let data: InitializeData = Self::read_envelope(response).await?;
        let authorization_url = data
            .authorization_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                PaymentError::InvalidResponse("missing authorization_url".to_string())
            })?;

        tracing::info!(
            reference = %request.reference,
            amount = request.amount_cents,
            "Payment transaction initialized"
        );

        Ok(InitializedTransaction {
            authorization_url,
            access_code: data.access_code,
            reference: data.reference.unwrap_or(request.reference),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn verify_reference(&self, reference: &str) -> PaymentResult<VerifiedTransaction> {
        let secret_key = self.secret_key()?;

        let response = self
            .http_client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(secret_key)
            .send()
            .await?;

        let raw: Value = Self::read_envelope(response).await?;
        let data: VerifyData = serde_json::from_value(raw.clone())
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        let status = ChargeStatus::from_provider(&data.status);

        tracing::debug!(
            reference = %reference,
            provider_status = %data.status,
            status = status.as_str(),
            "Payment reference verified"
        );

        Ok(VerifiedTransaction {
            reference: data.reference.unwrap_or_else(|| reference.to_string()),
            status,
            provider_status: data.status,
            amount_cents: data.amount,
            purpose: PaymentPurpose::from_metadata(&data.metadata),
            raw,
        })
    }
}

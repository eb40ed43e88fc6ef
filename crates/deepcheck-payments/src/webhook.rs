//! Provider webhook verification and parsing.
//!
//! The provider signs the raw request body with HMAC-SHA512 keyed by the account secret and
//! sends the lowercase hex digest in [`SIGNATURE_HEADER`].

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::error::{PaymentError, PaymentResult};
use crate::types::PaymentPurpose;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";
pub const SIGNATURE_HEADER_ALIAS: &str = "x-provider-signature";

const CHARGE_SUCCESS: &str = "charge.success";

/// Hex HMAC-SHA512 of `body`.
pub fn sign_payload(body: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `signature` against the body. Without a configured secret the delivery is accepted
/// on degraded trust.
pub fn verify_webhook_signature(
    raw_body: &[u8],
    signature: Option<&str>,
    secret: Option<&str>,
) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        tracing::warn!("No webhook secret configured, accepting unsigned webhook delivery");
        return true;
    };
    let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
        tracing::warn!("Webhook delivery has no signature header");
        return false;
    };

    let expected = sign_payload(raw_body, secret);
    let provided = signature.to_ascii_lowercase();
    if expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub email: Option<String>,
}

/// `charge.success` payload. Only `reference` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeData {
    pub reference: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub customer: Option<Customer>,
}

impl ChargeData {
    pub fn purpose(&self) -> PaymentPurpose {
        PaymentPurpose::from_metadata(&self.metadata)
    }
}

#[derive(Debug, Clone)]
pub enum PaystackEvent {
    ChargeSuccess(ChargeData),
    /// Acknowledged and ignored.
    Other { event: String },
}

pub fn parse_webhook(raw_body: &[u8]) -> PaymentResult<PaystackEvent> {
    let envelope: Envelope = serde_json::from_slice(raw_body)
        .map_err(|e| PaymentError::WebhookParse(format!("invalid envelope: {}", e)))?;

    if envelope.event != CHARGE_SUCCESS {
        return Ok(PaystackEvent::Other {
            event: envelope.event,
        });
    }

    let charge: ChargeData = serde_json::from_value(envelope.data)
        .map_err(|e| PaymentError::WebhookParse(format!("invalid charge data: {}", e)))?;
    if charge.reference.trim().is_empty() {
        return Err(PaymentError::WebhookParse("empty reference".to_string()));
    }
    Ok(PaystackEvent::ChargeSuccess(charge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    const SECRET: &str = "sk_test_webhook";

    #[test]
    fn test_valid_signature() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign_payload(body, SECRET);
        assert_eq!(signature.len(), 128);
        assert!(verify_webhook_signature(body, Some(signature.as_str()), Some(SECRET)));
    }

    #[test]
    fn test_uppercase_signature_accepted() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign_payload(body, SECRET).to_uppercase();
        assert!(verify_webhook_signature(body, Some(signature.as_str()), Some(SECRET)));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let signature = sign_payload(br#"{"event":"charge.success"}"#, SECRET);
        assert!(!verify_webhook_signature(
            br#"{"event":"charge.success","hacked":true}"#,
            Some(signature.as_str()),
            Some(SECRET)
        ));
    }

    #[test]
    fn test_wrong_secret_and_garbage_rejected() {
        let body = b"{}";
        let signature = sign_payload(body, "other");
        assert!(!verify_webhook_signature(body, Some(signature.as_str()), Some(SECRET)));
        assert!(!verify_webhook_signature(body, Some("garbage"), Some(SECRET)));
        assert!(!verify_webhook_signature(body, Some(""), Some(SECRET)));
        assert!(!verify_webhook_signature(body, None, Some(SECRET)));
    }

    #[test]
    fn test_missing_secret_accepts() {
        assert!(verify_webhook_signature(b"{}", None, None));
        assert!(verify_webhook_signature(b"{}", Some("anything"), Some("")));
    }

    #[test]
    fn test_parse_charge_success() {
        let order_id = Uuid::new_v4();
        let body = json!({
            "event": "charge.success",
            "data": {
                "reference": "ord_1",
                "amount": 100,
                "status": "success",
                "metadata": { "orderId": order_id },
                "customer": { "email": "a@b.co" },
                "authorization": { "bin": "408408" }
            }
        })
        .to_string();

        match parse_webhook(body.as_bytes()).unwrap() {
            PaystackEvent::ChargeSuccess(charge) => {
                assert_eq!(charge.reference, "ord_1");
                assert_eq!(charge.amount, Some(100));
                assert_eq!(charge.purpose(), PaymentPurpose::Order { order_id });
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_other_event_is_ignored() {
        let body = br#"{"event":"transfer.success","data":{"reference":"t_1"}}"#;
        assert!(matches!(
            parse_webhook(body).unwrap(),
            PaystackEvent::Other { ref event } if event == "transfer.success"
        ));
    }

    #[test]
    fn test_parse_charge_without_reference_fails() {
        let body = br#"{"event":"charge.success","data":{"amount":100}}"#;
        assert!(matches!(
            parse_webhook(body),
            Err(PaymentError::WebhookParse(_))
        ));
        assert!(parse_webhook(b"not json").is_err());
    }
}

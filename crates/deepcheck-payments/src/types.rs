use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Our view of a provider transaction state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Paid,
    Failed,
    Pending,
}

impl ChargeStatus {
    /// Maps a provider status string. Anything not explicitly settled stays pending.
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" => ChargeStatus::Paid,
            "failed" | "reversed" => ChargeStatus::Failed,
            _ => ChargeStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Paid => "paid",
            ChargeStatus::Failed => "failed",
            ChargeStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitializeTransaction {
    pub email: String,
    /// Minor units of `currency`.
    pub amount_cents: i64,
    pub reference: String,
    pub currency: Option<String>,
    pub callback_url: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InitializedTransaction {
    pub authorization_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct VerifiedTransaction {
    pub reference: String,
    pub status: ChargeStatus,
    /// Provider status text before mapping.
    pub provider_status: String,
    pub amount_cents: Option<i64>,
    pub purpose: PaymentPurpose,
    pub raw: Value,
}

/// What a charge paid for, classified from the metadata attached at initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentPurpose {
    Order { order_id: Uuid },
    TokenPurchase { tokens: i64, user_email: String },
    Unknown,
}

impl PaymentPurpose {
    /// Metadata built for an order checkout.
    pub fn order_metadata(order_id: Uuid) -> Value {
        serde_json::json!({ "purpose": "order", "orderId": order_id })
    }

    /// Metadata built for a token top-up.
    pub fn token_metadata(tokens: i64, user_email: &str) -> Value {
        serde_json::json!({
            "purpose": "token_purchase",
            "tokens": tokens,
            "userEmail": user_email,
        })
    }

    /// Accepts an object, a JSON-encoded string holding an object, or nothing.
    pub fn from_metadata(metadata: &Value) -> Self {
        let decoded;
        let object = match metadata {
            Value::Object(map) => map,
            Value::String(text) if !text.trim().is_empty() => {
                decoded = match serde_json::from_str::<Value>(text) {
                    Ok(value) => value,
                    Err(_) => return PaymentPurpose::Unknown,
                };
                match decoded {
                    Value::Object(ref map) => map,
                    _ => return PaymentPurpose::Unknown,
                }
            }
            _ => return PaymentPurpose::Unknown,
        };

        let text_field = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| object.get(*key).and_then(Value::as_str))
                .map(str::to_string)
        };

        if let Some(order_id) = text_field(&["orderId", "order_id"]) {
            return match Uuid::parse_str(&order_id) {
                Ok(order_id) => PaymentPurpose::Order { order_id },
                Err(_) => PaymentPurpose::Unknown,
            };
        }

        let tokens = object.get("tokens").and_then(|value| match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        match (tokens, text_field(&["userEmail", "user_email"])) {
            (Some(tokens), Some(user_email)) if tokens > 0 && !user_email.is_empty() => {
                PaymentPurpose::TokenPurchase { tokens, user_email }
            }
            _ => PaymentPurpose::Unknown,
        }
    }
}

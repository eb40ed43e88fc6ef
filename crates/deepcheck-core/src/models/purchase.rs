use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::User;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Credited,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Credited => "credited",
            PurchaseStatus::Failed => "failed",
        }
    }
}

impl Display for PurchaseStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "credited" => Ok(PurchaseStatus::Credited),
            "failed" => Ok(PurchaseStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid purchase status: {}", s)),
        }
    }
}

/// A card top-up of the token balance, keyed by the gateway reference.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPurchase {
    pub reference: String,
    pub user_id: Uuid,
    pub tokens: i64,
    pub amount_cents: i64,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTokenPurchase {
    pub reference: String,
    pub user_id: Uuid,
    pub tokens: i64,
    pub amount_cents: i64,
}

/// Outcome of crediting a purchase exactly once.
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Credited { purchase: TokenPurchase, user: User },
    AlreadyCredited(TokenPurchase),
    /// The purchase was marked failed earlier and will not be credited.
    Rejected(TokenPurchase),
}

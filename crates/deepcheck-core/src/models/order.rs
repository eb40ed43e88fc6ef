use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::pricing;

/// Order lifecycle.
///
/// The forward chain is `created → awaiting_payment → payment_pending → paid → processing →
/// completed`. `failed` and `cancelled` are reachable from `awaiting_payment`,
/// `payment_pending` and `processing`. The only other edges are the retry paths listed in
/// [`OrderStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    AwaitingPayment,
    PaymentPending,
    Paid,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// Payment has been confirmed (the order is past the payment stage).
    pub fn is_paid_or_later(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Processing | OrderStatus::Completed
        )
    }

    /// States a checkout may start from.
    pub fn accepts_payment(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::AwaitingPayment | OrderStatus::PaymentPending
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Created, AwaitingPayment)
            | (AwaitingPayment, PaymentPending)
            | (PaymentPending, Paid)
            | (Paid, Processing)
            | (Processing, Completed) => true,
            // Demo bypass and token rail never go through the gateway.
            (Created, Paid) | (AwaitingPayment, Paid) => true,
            // Retry paths.
            (PaymentPending, AwaitingPayment) | (Processing, Paid) => true,
            (AwaitingPayment | PaymentPending | Processing, Failed | Cancelled) => true,
            _ => false,
        }
    }

    /// Statuses from which `next` may be entered.
    pub fn predecessors(next: OrderStatus) -> Vec<OrderStatus> {
        ALL_ORDER_STATUSES
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

pub const ALL_ORDER_STATUSES: [OrderStatus; 8] = [
    OrderStatus::Created,
    OrderStatus::AwaitingPayment,
    OrderStatus::PaymentPending,
    OrderStatus::Paid,
    OrderStatus::Processing,
    OrderStatus::Completed,
    OrderStatus::Failed,
    OrderStatus::Cancelled,
];

impl Display for OrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_ORDER_STATUSES
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid order status: {}", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub upload_ids: Vec<Uuid>,
    pub user_id: Option<Uuid>,
    pub total_amount_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_ref: Option<String>,
    pub notes: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Authenticated viewers see their own orders; anonymous viewers see unclaimed orders.
    pub fn is_accessible_by(&self, viewer: Option<Uuid>) -> bool {
        match (viewer, self.user_id) {
            (Some(viewer), Some(owner)) => viewer == owner,
            (None, None) => true,
            _ => false,
        }
    }

    /// Upload sent to the detector. Only the first upload is processed.
    pub fn primary_upload_id(&self) -> Option<Uuid> {
        self.upload_ids.first().copied()
    }

    pub fn without_result(mut self) -> Self {
        self.result = None;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub upload_ids: Vec<Uuid>,
    pub user_id: Option<Uuid>,
    pub total_amount_cents: i64,
    pub currency: String,
    pub notes: Option<String>,
}

impl NewOrder {
    /// Builds an order draft priced from its upload count.
    pub fn new(
        upload_ids: Vec<Uuid>,
        user_id: Option<Uuid>,
        currency: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            total_amount_cents: pricing::price(upload_ids.len()),
            upload_ids,
            user_id,
            currency: currency.into(),
            notes,
        }
    }
}

/// Outcome of a compare-and-swap into `paid`.
#[derive(Debug, Clone)]
pub enum MarkPaidOutcome {
    /// The order moved to `paid` and a detection job was recorded.
    Transitioned(Order),
    /// Payment was already recorded; nothing changed.
    AlreadyPaid(Order),
    /// The order is in a state that cannot accept payment (failed, cancelled).
    NotPayable(Order),
}

impl MarkPaidOutcome {
    pub fn order(&self) -> &Order {
        match self {
            MarkPaidOutcome::Transitioned(o)
            | MarkPaidOutcome::AlreadyPaid(o)
            | MarkPaidOutcome::NotPayable(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            MarkPaidOutcome::Transitioned(o)
            | MarkPaidOutcome::AlreadyPaid(o)
            | MarkPaidOutcome::NotPayable(o) => o,
        }
    }
}

/// Outcome of settling an order from uploads its payer funded with tokens.
#[derive(Debug, Clone)]
pub enum RedeemOutcome {
    /// The prepaid funding was bound to the order and the paid transition was attempted.
    Paid(MarkPaidOutcome),
    /// Some upload is not prepaid by the payer, or its funding already settled another
    /// order. Nothing changed.
    FundingUnavailable(Order),
}

/// Outcome of binding a user to an order.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed(Order),
    AlreadyOwned(Order),
    OwnedByOther(Order),
}

//! Order lifecycle: creation, authorization, ownership claim and the paid transition.

use deepcheck_core::constants::{DEFAULT_ORDER_LIST_LIMIT, MAX_ORDER_LIST_LIMIT};
use deepcheck_core::models::{
    ClaimOutcome, MarkPaidOutcome, NewOrder, Order, OrderStatus, RedeemOutcome, UploadStatus,
};
use deepcheck_core::AppError;
use deepcheck_db::Ledger;
use deepcheck_worker::DetectionQueue;
use std::collections::HashSet;
use uuid::Uuid;

const MAX_NOTES_LEN: usize = 2_000;

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub upload_ids: Vec<Uuid>,
    pub currency: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    ledger: Ledger,
    default_currency: String,
}

impl OrderService {
    pub fn new(ledger: Ledger, default_currency: impl Into<String>) -> Self {
        Self {
            ledger,
            default_currency: default_currency.into(),
        }
    }

    fn normalize_currency(&self, currency: Option<&str>) -> Result<String, AppError> {
        let currency = currency
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_currency)
            .to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::InvalidRequest(format!(
                "Invalid currency code: {}",
                currency
            )));
        }
        Ok(currency)
    }

    /// Validates the upload set and inserts a priced order awaiting payment. An authenticated
    /// creator becomes the owner.
    #[tracing::instrument(skip(self, request), fields(uploads = request.upload_ids.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrder,
        owner: Option<Uuid>,
    ) -> Result<Order, AppError> {
        if request.upload_ids.is_empty() {
            return Err(AppError::InvalidRequest(
                "uploadIds must contain at least one upload".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(request.upload_ids.len());
        if let Some(dup) = request.upload_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(AppError::InvalidRequest(format!(
                "Duplicate upload id: {}",
                dup
            )));
        }

        for id in &request.upload_ids {
            match self.ledger.uploads.get_upload(*id).await? {
                Some(upload) if upload.status == UploadStatus::Uploaded => {}
                Some(upload) => {
                    return Err(AppError::InvalidRequest(format!(
                        "Upload {} is {}",
                        id, upload.status
                    )))
                }
                None => {
                    return Err(AppError::InvalidRequest(format!(
                        "Upload {} does not exist",
                        id
                    )))
                }
            }
        }

        let notes = request
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(AppError::InvalidRequest(format!(
                "notes must be at most {} characters",
                MAX_NOTES_LEN
            )));
        }

        let currency = self.normalize_currency(request.currency.as_deref())?;
        let order = self
            .ledger
            .orders
            .create_order(NewOrder::new(request.upload_ids, owner, currency, notes))
            .await?;

        tracing::info!(
            order_id = %order.id,
            amount_cents = order.total_amount_cents,
            owner = ?order.user_id,
            "Order created"
        );
        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order, AppError> {
        self.ledger
            .orders
            .get_order(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))
    }

    /// Loads the order and applies the access rule for `viewer`.
    pub async fn get_authorized(&self, id: Uuid, viewer: Option<Uuid>) -> Result<Order, AppError> {
        let order = self.get_order(id).await?;
        authorize(&order, viewer)?;
        Ok(order)
    }

    pub async fn list_for_user(&self, user_id: Uuid, limit: Option<i64>) -> Result<Vec<Order>, AppError> {
        let limit = limit
            .unwrap_or(DEFAULT_ORDER_LIST_LIMIT)
            .clamp(1, MAX_ORDER_LIST_LIMIT);
        Ok(self.ledger.orders.list_orders_for_user(user_id, limit).await?)
    }

    /// Binds an unowned order to `user_id`. Fails with `AccessDenied` if someone else owns it.
    #[tracing::instrument(skip(self))]
    pub async fn claim(&self, id: Uuid, user_id: Uuid) -> Result<Order, AppError> {
        match self.ledger.orders.update_order_user(id, user_id).await? {
            Some(ClaimOutcome::Claimed(order)) => {
                tracing::info!(order_id = %id, %user_id, "Order claimed");
                Ok(order)
            }
            Some(ClaimOutcome::AlreadyOwned(order)) => Ok(order),
            Some(ClaimOutcome::OwnedByOther(_)) => Err(AppError::AccessDenied(
                "Order belongs to another user".to_string(),
            )),
            None => Err(AppError::NotFound(format!("Order {} not found", id))),
        }
    }

    /// Compare-and-swap into `paid`, recording the detection job in the same write. Wakes the
    /// worker when the order actually transitioned.
    #[tracing::instrument(skip(self, queue))]
    pub async fn mark_paid(
        &self,
        id: Uuid,
        reference: &str,
        queue: &DetectionQueue,
    ) -> Result<MarkPaidOutcome, AppError> {
        let outcome = self
            .ledger
            .orders
            .mark_paid(id, reference, queue.policy())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;

        record_paid_outcome(&outcome, reference, queue);
        Ok(outcome)
    }

    /// Settles the order from uploads `payer` already funded with tokens. Each upload's funding
    /// pays for one order only; a second order over the same uploads gets
    /// [`RedeemOutcome::FundingUnavailable`] and stays unpaid.
    #[tracing::instrument(skip(self, queue))]
    pub async fn redeem_prepaid(
        &self,
        id: Uuid,
        reference: &str,
        payer: Uuid,
        queue: &DetectionQueue,
    ) -> Result<RedeemOutcome, AppError> {
        let outcome = self
            .ledger
            .orders
            .redeem_prepaid_uploads(id, reference, payer, queue.policy())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;

        if let RedeemOutcome::Paid(ref paid) = outcome {
            record_paid_outcome(paid, reference, queue);
        }
        Ok(outcome)
    }

    /// Gateway reported the charge failed: hand the order back for another checkout, if
    /// `reference` is still its current checkout.
    pub async fn reopen_checkout(&self, id: Uuid, reference: &str) -> Result<Option<Order>, AppError> {
        let order = self.get_order(id).await?;
        if order.payment_ref.as_deref() != Some(reference) {
            return Ok(None);
        }
        Ok(self
            .ledger
            .orders
            .transition_status(id, &[OrderStatus::PaymentPending], OrderStatus::AwaitingPayment)
            .await?)
    }
}

pub fn authorize(order: &Order, viewer: Option<Uuid>) -> Result<(), AppError> {
    if order.is_accessible_by(viewer) {
        Ok(())
    } else if viewer.is_none() {
        Err(AppError::AccessDenied(
            "Sign in to access this order".to_string(),
        ))
    } else {
        Err(AppError::AccessDenied(
            "Order belongs to another user".to_string(),
        ))
    }
}

fn record_paid_outcome(outcome: &MarkPaidOutcome, reference: &str, queue: &DetectionQueue) {
    match outcome {
        MarkPaidOutcome::Transitioned(order) => {
            tracing::info!(order_id = %order.id, reference, "Order marked paid");
            queue.wake();
        }
        MarkPaidOutcome::AlreadyPaid(order) => {
            tracing::debug!(order_id = %order.id, status = %order.status, "Order already paid");
        }
        MarkPaidOutcome::NotPayable(order) => {
            tracing::warn!(
                order_id = %order.id,
                status = %order.status,
                reference,
                "Payment confirmed for an order that no longer accepts payment"
            );
        }
    }
}

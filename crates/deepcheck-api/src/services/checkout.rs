//! Order checkout. A payer is settled on one of three rails, tried in order: demo accounts,
//! uploads already funded with tokens, and finally a card transaction at the gateway.

use chrono::Utc;
use deepcheck_core::constants::{
    DEMO_REFERENCE_PREFIX, ORDER_REFERENCE_PREFIX, TOKEN_RAIL_REFERENCE_PREFIX,
};
use deepcheck_core::models::{Order, OrderStatus, RedeemOutcome, User};
use deepcheck_core::AppError;
use deepcheck_payments::{InitializeTransaction, PaymentPurpose};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    /// Demo account: paid immediately without a charge.
    Demo,
    /// Every upload was already paid for with the payer's tokens.
    Tokens,
    /// Card transaction started; redirect the payer to `authorizationUrl`.
    Card,
    /// The order was paid before this call.
    AlreadyPaid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub reference: Option<String>,
    pub mode: CheckoutMode,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
}

impl CheckoutResponse {
    fn settled(order: &Order, mode: CheckoutMode) -> Self {
        Self {
            order_id: order.id,
            reference: order.payment_ref.clone(),
            mode,
            status: order.status,
            authorization_url: None,
            access_code: None,
        }
    }
}

/// Claims the order for `payer` and settles it on the first rail that applies.
#[tracing::instrument(skip(state, payer), fields(user_id = %payer.id))]
pub async fn checkout(
    state: &AppState,
    order_id: Uuid,
    payer: &User,
) -> Result<CheckoutResponse, AppError> {
    let order = state.orders.claim(order_id, payer.id).await?;

    if order.status.is_paid_or_later() {
        return Ok(CheckoutResponse::settled(&order, CheckoutMode::AlreadyPaid));
    }
    if !order.status.accepts_payment() {
        return Err(AppError::InvalidState(format!(
            "Order {} is {} and cannot be paid",
            order.id, order.status
        )));
    }

    if state.tokens.is_demo_account(&payer.email) {
        let reference = format!("{}{}", DEMO_REFERENCE_PREFIX, Uuid::new_v4().simple());
        let order = state
            .orders
            .mark_paid(order.id, &reference, &state.queue)
            .await?
            .into_order();
        tracing::info!(order_id = %order.id, "Demo checkout settled");
        return Ok(CheckoutResponse::settled(&order, CheckoutMode::Demo));
    }

    if prepaid_with_tokens(state, &order, payer.id).await? {
        let reference = format!("{}{}", TOKEN_RAIL_REFERENCE_PREFIX, order.id.simple());
        match state
            .orders
            .redeem_prepaid(order.id, &reference, payer.id, &state.queue)
            .await?
        {
            RedeemOutcome::Paid(paid) => {
                let order = paid.into_order();
                tracing::info!(order_id = %order.id, "Token-funded checkout settled");
                return Ok(CheckoutResponse::settled(&order, CheckoutMode::Tokens));
            }
            RedeemOutcome::FundingUnavailable(_) => {
                tracing::info!(
                    order_id = %order.id,
                    "Upload funding already settled another order, charging by card"
                );
            }
        }
    }

    card_checkout(state, order, payer).await
}

/// True when every upload in the order was funded by `user_id` at submission time. Whether
/// that funding is still unspent is decided when it is redeemed.
async fn prepaid_with_tokens(
    state: &AppState,
    order: &Order,
    user_id: Uuid,
) -> Result<bool, AppError> {
    for upload_id in &order.upload_ids {
        let funded = state
            .ledger
            .uploads
            .get_upload(*upload_id)
            .await?
            .is_some_and(|upload| upload.funding().is_prepaid_by(user_id));
        if !funded {
            return Ok(false);
        }
    }
    Ok(!order.upload_ids.is_empty())
}

async fn card_checkout(
    state: &AppState,
    order: Order,
    payer: &User,
) -> Result<CheckoutResponse, AppError> {
    let reference = format!(
        "{}{}_{}",
        ORDER_REFERENCE_PREFIX,
        order.id.simple(),
        Utc::now().timestamp_millis()
    );

    let initialized = state
        .gateway
        .initialize_transaction(InitializeTransaction {
            email: payer.email.clone(),
            amount_cents: order.total_amount_cents,
            reference: reference.clone(),
            currency: Some(order.currency.clone()),
            callback_url: state.config.payment_callback_url().map(str::to_string),
            metadata: PaymentPurpose::order_metadata(order.id),
        })
        .await?;

    // The gateway may echo a normalized reference; ours is the one recorded on the order.
    let order = state
        .ledger
        .orders
        .begin_checkout(order.id, &reference)
        .await?
        .ok_or_else(|| {
            AppError::InvalidState(format!("Order {} changed state during checkout", order.id))
        })?;

    tracing::info!(order_id = %order.id, %reference, "Card checkout started");
    Ok(CheckoutResponse {
        order_id: order.id,
        reference: Some(reference),
        mode: CheckoutMode::Card,
        status: order.status,
        authorization_url: Some(initialized.authorization_url),
        access_code: initialized.access_code,
    })
}

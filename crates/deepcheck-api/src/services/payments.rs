//! Token purchases and payment reconciliation.
//!
//! Webhooks and client-side polling both end in [`reconcile`]. Each gateway reference is
//! applied at most once: orders through the compare-and-swap into `paid`, purchases through
//! the credit-once ledger row.

use deepcheck_core::constants::{
    MAX_TOKEN_PURCHASE, MIN_TOKEN_PURCHASE, TOKEN_PURCHASE_REFERENCE_PREFIX,
};
use deepcheck_core::models::{CreditOutcome, NewTokenPurchase, Order, TokenPurchase, User};
use deepcheck_core::{cents_for_tokens, AppError};
use deepcheck_payments::{ChargeStatus, InitializeTransaction, PaymentPurpose};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseStarted {
    pub reference: String,
    pub tokens: i64,
    pub amount_cents: i64,
    pub authorization_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
}

/// Opens a card transaction for `tokens` tokens and records the pending purchase.
#[tracing::instrument(skip(state, buyer), fields(user_id = %buyer.id))]
pub async fn start_token_purchase(
    state: &AppState,
    buyer: &User,
    tokens: i64,
) -> Result<PurchaseStarted, AppError> {
    if !(MIN_TOKEN_PURCHASE..=MAX_TOKEN_PURCHASE).contains(&tokens) {
        return Err(AppError::InvalidRequest(format!(
            "tokens must be between {} and {}",
            MIN_TOKEN_PURCHASE, MAX_TOKEN_PURCHASE
        )));
    }

    let reference = format!(
        "{}{}",
        TOKEN_PURCHASE_REFERENCE_PREFIX,
        Uuid::new_v4().simple()
    );
    let amount_cents = cents_for_tokens(tokens);

    let initialized = state
        .gateway
        .initialize_transaction(InitializeTransaction {
            email: buyer.email.clone(),
            amount_cents,
            reference: reference.clone(),
            currency: Some(state.config.default_currency().to_string()),
            callback_url: state.config.payment_callback_url().map(str::to_string),
            metadata: PaymentPurpose::token_metadata(tokens, &buyer.email),
        })
        .await?;

    state
        .ledger
        .purchases
        .create_purchase(NewTokenPurchase {
            reference: reference.clone(),
            user_id: buyer.id,
            tokens,
            amount_cents,
        })
        .await?;

    tracing::info!(%reference, tokens, amount_cents, "Token purchase started");
    Ok(PurchaseStarted {
        reference,
        tokens,
        amount_cents,
        authorization_url: initialized.authorization_url,
        access_code: initialized.access_code,
    })
}

/// What a gateway reference resolved to after reconciliation.
#[derive(Debug, Clone)]
pub enum Reconciliation {
    Order(Order),
    Purchase {
        purchase: TokenPurchase,
        /// Buyer's balance after the credit, when the buyer is known.
        balance: Option<i64>,
    },
    /// Neither an order nor a purchase carries this reference.
    Unmatched,
}

/// Applies a gateway verdict for `reference`.
///
/// `purpose` comes from the metadata attached at initialization. When it is missing the
/// reference is looked up in the ledger instead. `amount_cents` is the amount the gateway
/// reports as charged, if any.
#[tracing::instrument(skip(state, purpose))]
pub async fn reconcile(
    state: &AppState,
    reference: &str,
    status: ChargeStatus,
    purpose: PaymentPurpose,
    amount_cents: Option<i64>,
) -> Result<Reconciliation, AppError> {
    match purpose {
        PaymentPurpose::Order { order_id } => {
            reconcile_order(state, order_id, reference, status, amount_cents).await
        }
        PaymentPurpose::TokenPurchase { tokens, user_email } => {
            let user = state.tokens.get_or_create_user(&user_email).await?;
            let purchase = NewTokenPurchase {
                reference: reference.to_string(),
                user_id: user.id,
                tokens,
                amount_cents: cents_for_tokens(tokens),
            };
            reconcile_purchase(state, purchase, status, amount_cents).await
        }
        PaymentPurpose::Unknown => {
            if let Some(order) = state.ledger.orders.get_order_by_payment_ref(reference).await? {
                return reconcile_order(state, order.id, reference, status, amount_cents).await;
            }
            if let Some(stored) = state.ledger.purchases.get_purchase(reference).await? {
                let purchase = NewTokenPurchase {
                    reference: stored.reference,
                    user_id: stored.user_id,
                    tokens: stored.tokens,
                    amount_cents: stored.amount_cents,
                };
                return reconcile_purchase(state, purchase, status, amount_cents).await;
            }
            tracing::warn!(reference, "Payment reference matches no order or purchase");
            Ok(Reconciliation::Unmatched)
        }
    }
}

async fn reconcile_order(
    state: &AppState,
    order_id: Uuid,
    reference: &str,
    status: ChargeStatus,
    amount_cents: Option<i64>,
) -> Result<Reconciliation, AppError> {
    let order = match status {
        ChargeStatus::Paid => {
            let order = state.orders.get_order(order_id).await?;
            if let Some(charged) = amount_cents {
                if charged < order.total_amount_cents {
                    tracing::warn!(
                        order_id = %order.id,
                        charged,
                        expected = order.total_amount_cents,
                        reference,
                        "Charge is below the order total, not marking paid"
                    );
                    return Ok(Reconciliation::Order(order));
                }
            }
            state
                .orders
                .mark_paid(order_id, reference, &state.queue)
                .await?
                .into_order()
        }
        ChargeStatus::Failed => match state.orders.reopen_checkout(order_id, reference).await? {
            Some(order) => {
                tracing::info!(order_id = %order.id, reference, "Charge failed, checkout reopened");
                order
            }
            None => state.orders.get_order(order_id).await?,
        },
        ChargeStatus::Pending => state.orders.get_order(order_id).await?,
    };
    Ok(Reconciliation::Order(order))
}

/// Purchases credit only when the gateway reports a charge covering the tokens. An unknown
/// amount is treated as a short charge.
async fn reconcile_purchase(
    state: &AppState,
    purchase: NewTokenPurchase,
    status: ChargeStatus,
    charged: Option<i64>,
) -> Result<Reconciliation, AppError> {
    let reference = purchase.reference.clone();
    match status {
        ChargeStatus::Paid => {
            let stored = state.ledger.purchases.get_purchase(&reference).await?;
            let required = match &stored {
                Some(stored) => cents_for_tokens(stored.tokens).max(stored.amount_cents),
                None => purchase.amount_cents,
            };
            if !charged.is_some_and(|c| c >= required) {
                tracing::warn!(
                    %reference,
                    charged,
                    expected = required,
                    "Charge is below the purchase amount, not crediting"
                );
                return Ok(stored
                    .map(|purchase| Reconciliation::Purchase {
                        purchase,
                        balance: None,
                    })
                    .unwrap_or(Reconciliation::Unmatched));
            }
            credit_purchase(state, purchase).await
        }
        ChargeStatus::Failed => {
            let failed = state.ledger.purchases.fail_purchase(&reference).await?;
            let purchase = match failed {
                Some(purchase) => Some(purchase),
                None => state.ledger.purchases.get_purchase(&reference).await?,
            };
            Ok(purchase
                .map(|purchase| Reconciliation::Purchase {
                    purchase,
                    balance: None,
                })
                .unwrap_or(Reconciliation::Unmatched))
        }
        ChargeStatus::Pending => Ok(state
            .ledger
            .purchases
            .get_purchase(&reference)
            .await?
            .map(|purchase| Reconciliation::Purchase {
                purchase,
                balance: None,
            })
            .unwrap_or(Reconciliation::Unmatched)),
    }
}

async fn credit_purchase(
    state: &AppState,
    purchase: NewTokenPurchase,
) -> Result<Reconciliation, AppError> {
    let reference = purchase.reference.clone();
    match state.ledger.purchases.credit_purchase(purchase).await? {
        CreditOutcome::Credited { purchase, user } => {
            tracing::info!(
                %reference,
                user_id = %user.id,
                tokens = purchase.tokens,
                balance = user.tokens,
                "Token purchase credited"
            );
            Ok(Reconciliation::Purchase {
                purchase,
                balance: Some(user.tokens),
            })
        }
        CreditOutcome::AlreadyCredited(purchase) => {
            let balance = state
                .ledger
                .users
                .get_user(purchase.user_id)
                .await?
                .map(|u| u.tokens);
            Ok(Reconciliation::Purchase { purchase, balance })
        }
        CreditOutcome::Rejected(purchase) => {
            tracing::warn!(%reference, "Success reported for a purchase already marked failed");
            Ok(Reconciliation::Purchase {
                purchase,
                balance: None,
            })
        }
    }
}

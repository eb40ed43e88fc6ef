use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deepcheck_core::models::{CreditOutcome, NewTokenPurchase, PurchaseStatus, TokenPurchase, User};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::traits::PurchaseStore;

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    reference: String,
    user_id: Uuid,
    tokens: i64,
    amount_cents: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for TokenPurchase {
    type Error = StorageError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let status: PurchaseStatus = row
            .status
            .parse()
            .map_err(|e| StorageError::integrity("token_purchase", &row.reference, e))?;
        Ok(TokenPurchase {
            reference: row.reference,
            user_id: row.user_id,
            tokens: row.tokens,
            amount_cents: row.amount_cents,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PurchaseRepository {
    pool: PgPool,
}

impl PurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchaseStore for PurchaseRepository {
    #[tracing::instrument(skip(self, purchase), fields(reference = %purchase.reference))]
    async fn create_purchase(&self, purchase: NewTokenPurchase) -> StorageResult<TokenPurchase> {
        let row = sqlx::query_as::<Postgres, PurchaseRow>(
            r#"
            INSERT INTO token_purchases (reference, user_id, tokens, amount_cents, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING reference, user_id, tokens, amount_cents, status, created_at, updated_at
            "#,
        )
        .bind(&purchase.reference)
        .bind(purchase.user_id)
        .bind(purchase.tokens)
        .bind(purchase.amount_cents)
        .fetch_one(&self.pool)
        .await?;

        TokenPurchase::try_from(row)
    }

    #[tracing::instrument(skip(self))]
    async fn get_purchase(&self, reference: &str) -> StorageResult<Option<TokenPurchase>> {
        let row = sqlx::query_as::<Postgres, PurchaseRow>(
            r#"
            SELECT reference, user_id, tokens, amount_cents, status, created_at, updated_at
            FROM token_purchases
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TokenPurchase::try_from).transpose()
    }

    #[tracing::instrument(skip(self, purchase), fields(reference = %purchase.reference))]
    async fn credit_purchase(&self, purchase: NewTokenPurchase) -> StorageResult<CreditOutcome> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO token_purchases (reference, user_id, tokens, amount_cents, status)
            VALUES ($1, $2, $3, $4, 'pending')
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(&purchase.reference)
        .bind(purchase.user_id)
        .bind(purchase.tokens)
        .bind(purchase.amount_cents)
        .execute(&mut *tx)
        .await?;

        let credited = sqlx::query_as::<Postgres, PurchaseRow>(
            r#"
            UPDATE token_purchases
            SET status = 'credited', updated_at = NOW()
            WHERE reference = $1 AND status = 'pending'
            RETURNING reference, user_id, tokens, amount_cents, status, created_at, updated_at
            "#,
        )
        .bind(&purchase.reference)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = credited {
            let credited = TokenPurchase::try_from(row)?;
            // The stored row is authoritative for amount and owner.
            let user = sqlx::query_as::<Postgres, User>(
                r#"
                UPDATE users
                SET tokens = tokens + $2, updated_at = NOW()
                WHERE id = $1
                RETURNING id, email, tokens, created_at, updated_at
                "#,
            )
            .bind(credited.user_id)
            .bind(credited.tokens)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;

            tracing::info!(
                reference = %credited.reference,
                user_id = %user.id,
                tokens = credited.tokens,
                balance = user.tokens,
                "Token purchase credited"
            );
            return Ok(CreditOutcome::Credited {
                purchase: credited,
                user,
            });
        }

        let existing = sqlx::query_as::<Postgres, PurchaseRow>(
            r#"
            SELECT reference, user_id, tokens, amount_cents, status, created_at, updated_at
            FROM token_purchases
            WHERE reference = $1
            "#,
        )
        .bind(&purchase.reference)
        .fetch_one(&mut *tx)
        .await?;
        tx.rollback().await.ok();

        let existing = TokenPurchase::try_from(existing)?;
        Ok(match existing.status {
            PurchaseStatus::Failed => CreditOutcome::Rejected(existing),
            _ => CreditOutcome::AlreadyCredited(existing),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn fail_purchase(&self, reference: &str) -> StorageResult<Option<TokenPurchase>> {
        let row = sqlx::query_as::<Postgres, PurchaseRow>(
            r#"
            UPDATE token_purchases
            SET status = 'failed', updated_at = NOW()
            WHERE reference = $1 AND status = 'pending'
            RETURNING reference, user_id, tokens, amount_cents, status, created_at, updated_at
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TokenPurchase::try_from).transpose()
    }
}

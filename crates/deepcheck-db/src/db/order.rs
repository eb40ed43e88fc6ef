use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deepcheck_core::models::{
    ClaimOutcome, JobPolicy, MarkPaidOutcome, NewOrder, Order, OrderStatus, RedeemOutcome,
};
use sqlx::{PgConnection, PgPool, Postgres};
use uuid::Uuid;

use super::job::insert_job_for_paid_order;
use crate::error::{StorageError, StorageResult};
use crate::traits::OrderStore;

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    upload_ids: serde_json::Value,
    user_id: Option<Uuid>,
    total_amount_cents: i64,
    currency: String,
    status: String,
    payment_ref: Option<String>,
    notes: Option<String>,
    result: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StorageError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let upload_ids: Vec<Uuid> = serde_json::from_value(row.upload_ids)
            .map_err(|e| StorageError::integrity("order", row.id, format!("upload_ids: {}", e)))?;
        let status: OrderStatus = row
            .status
            .parse()
            .map_err(|e| StorageError::integrity("order", row.id, e))?;
        Ok(Order {
            id: row.id,
            upload_ids,
            user_id: row.user_id,
            total_amount_cents: row.total_amount_cents,
            currency: row.currency,
            status,
            payment_ref: row.payment_ref,
            notes: row.notes,
            result: row.result,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Paid CAS on an open transaction. The caller commits or rolls back.
async fn set_paid(
    conn: &mut PgConnection,
    id: Uuid,
    reference: &str,
) -> StorageResult<Option<Order>> {
    let row = sqlx::query_as::<Postgres, OrderRow>(
        r#"
        UPDATE orders
        SET payment_ref = $2, status = 'paid', updated_at = NOW()
        WHERE id = $1 AND status IN ('created', 'awaiting_payment', 'payment_pending')
        RETURNING id, upload_ids, user_id, total_amount_cents, currency, status,
                  payment_ref, notes, result, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(reference)
    .fetch_optional(conn)
    .await?;

    row.map(Order::try_from).transpose()
}

fn status_texts(statuses: &[OrderStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn unpaid_outcome(&self, id: Uuid) -> StorageResult<Option<MarkPaidOutcome>> {
        Ok(self.fetch(id).await?.map(|order| {
            if order.status.is_paid_or_later() {
                MarkPaidOutcome::AlreadyPaid(order)
            } else {
                MarkPaidOutcome::NotPayable(order)
            }
        }))
    }

    async fn fetch(&self, id: Uuid) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            SELECT id, upload_ids, user_id, total_amount_cents, currency, status,
                   payment_ref, notes, result, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    #[tracing::instrument(skip(self, order), fields(uploads = order.upload_ids.len()))]
    async fn create_order(&self, order: NewOrder) -> StorageResult<Order> {
        let upload_ids = serde_json::to_value(&order.upload_ids)
            .map_err(|e| StorageError::Integrity(format!("upload_ids: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        let bound = sqlx::query(
            r#"
            UPDATE uploads
            SET attached = TRUE
            WHERE id = ANY($1) AND status = 'uploaded'
            "#,
        )
        .bind(&order.upload_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if bound != order.upload_ids.len() as u64 {
            tx.rollback().await.ok();
            return Err(StorageError::Conflict(
                "One or more uploads are no longer available".to_string(),
            ));
        }

        let row = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            INSERT INTO orders (id, upload_ids, user_id, total_amount_cents, currency, status, notes)
            VALUES ($1, $2, $3, $4, $5, 'awaiting_payment', $6)
            RETURNING id, upload_ids, user_id, total_amount_cents, currency, status,
                      payment_ref, notes, result, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(upload_ids)
        .bind(order.user_id)
        .bind(order.total_amount_cents)
        .bind(&order.currency)
        .bind(&order.notes)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let order = Order::try_from(row)?;
        tracing::info!(
            order_id = %order.id,
            total_amount_cents = order.total_amount_cents,
            "Order created"
        );
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    async fn get_order(&self, id: Uuid) -> StorageResult<Option<Order>> {
        self.fetch(id).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_order_by_payment_ref(&self, reference: &str) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            SELECT id, upload_ids, user_id, total_amount_cents, currency, status,
                   payment_ref, notes, result, created_at, updated_at
            FROM orders
            WHERE payment_ref = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_orders(&self) -> StorageResult<Vec<Order>> {
        let rows = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            SELECT id, upload_ids, user_id, total_amount_cents, currency, status,
                   payment_ref, notes, result, created_at, updated_at
            FROM orders
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn list_orders_for_user(&self, user_id: Uuid, limit: i64) -> StorageResult<Vec<Order>> {
        let rows = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            SELECT id, upload_ids, user_id, total_amount_cents, currency, status,
                   payment_ref, notes, result, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, upload_ids, user_id, total_amount_cents, currency, status,
                      payment_ref, notes, result, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn set_order_payment_ref(
        &self,
        id: Uuid,
        reference: &str,
    ) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            UPDATE orders
            SET payment_ref = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, upload_ids, user_id, total_amount_cents, currency, status,
                      payment_ref, notes, result, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    #[tracing::instrument(skip(self, result))]
    async fn set_order_result(
        &self,
        id: Uuid,
        result: serde_json::Value,
    ) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            UPDATE orders
            SET result = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, upload_ids, user_id, total_amount_cents, currency, status,
                      payment_ref, notes, result, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(result)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn update_order_user(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<Option<ClaimOutcome>> {
        let claimed = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            UPDATE orders
            SET user_id = $2, updated_at = NOW()
            WHERE id = $1 AND user_id IS NULL
            RETURNING id, upload_ids, user_id, total_amount_cents, currency, status,
                      payment_ref, notes, result, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = claimed {
            let order = Order::try_from(row)?;
            tracing::info!(order_id = %id, user_id = %user_id, "Order claimed");
            return Ok(Some(ClaimOutcome::Claimed(order)));
        }

        Ok(self.fetch(id).await?.map(|order| {
            if order.user_id == Some(user_id) {
                ClaimOutcome::AlreadyOwned(order)
            } else {
                ClaimOutcome::OwnedByOther(order)
            }
        }))
    }

    #[tracing::instrument(skip(self))]
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            UPDATE orders
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = ANY($2)
            RETURNING id, upload_ids, user_id, total_amount_cents, currency, status,
                      payment_ref, notes, result, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status_texts(from))
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let order = row.map(Order::try_from).transpose()?;
        if order.is_some() {
            tracing::debug!(order_id = %id, status = %to, "Order status changed");
        }
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    async fn begin_checkout(&self, id: Uuid, reference: &str) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            UPDATE orders
            SET payment_ref = $2, status = 'payment_pending', updated_at = NOW()
            WHERE id = $1 AND status IN ('created', 'awaiting_payment', 'payment_pending')
            RETURNING id, upload_ids, user_id, total_amount_cents, currency, status,
                      payment_ref, notes, result, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn mark_paid(
        &self,
        id: Uuid,
        reference: &str,
        policy: JobPolicy,
    ) -> StorageResult<Option<MarkPaidOutcome>> {
        let mut tx = self.pool.begin().await?;

        let Some(order) = set_paid(&mut *tx, id, reference).await? else {
            tx.rollback().await.ok();
            return self.unpaid_outcome(id).await;
        };

        insert_job_for_paid_order(&mut *tx, order.id, policy).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, reference, "Order marked paid");
        Ok(Some(MarkPaidOutcome::Transitioned(order)))
    }

    #[tracing::instrument(skip(self))]
    async fn redeem_prepaid_uploads(
        &self,
        id: Uuid,
        reference: &str,
        payer: Uuid,
        policy: JobPolicy,
    ) -> StorageResult<Option<RedeemOutcome>> {
        let mut tx = self.pool.begin().await?;

        let Some(order) = set_paid(&mut *tx, id, reference).await? else {
            tx.rollback().await.ok();
            return Ok(self.unpaid_outcome(id).await?.map(RedeemOutcome::Paid));
        };

        let redeemed = sqlx::query(
            r#"
            UPDATE uploads
            SET redeemed_order_id = $1
            WHERE id = ANY($2)
              AND status = 'uploaded'
              AND metadata->>'funding' IN ('tokens', 'demo')
              AND metadata->>'userId' = $3
              AND (redeemed_order_id IS NULL OR redeemed_order_id = $1)
            "#,
        )
        .bind(order.id)
        .bind(&order.upload_ids)
        .bind(payer.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if order.upload_ids.is_empty() || redeemed != order.upload_ids.len() as u64 {
            tx.rollback().await.ok();
            tracing::info!(order_id = %id, "Prepaid funding unavailable for order");
            return Ok(self.fetch(id).await?.map(RedeemOutcome::FundingUnavailable));
        }

        insert_job_for_paid_order(&mut *tx, order.id, policy).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, reference, "Order paid from prepaid uploads");
        Ok(Some(RedeemOutcome::Paid(MarkPaidOutcome::Transitioned(order))))
    }

    #[tracing::instrument(skip(self, result))]
    async fn complete_order(
        &self,
        id: Uuid,
        result: serde_json::Value,
    ) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<Postgres, OrderRow>(
            r#"
            UPDATE orders
            SET result = $2, status = 'completed', updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING id, upload_ids, user_id, total_amount_cents, currency, status,
                      payment_ref, notes, result, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(result)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }
}

//! Store traits for the ledger.
//!
//! Status changes that guard money or external calls are compare-and-swap operations: they
//! return `None` (or a non-transitioned outcome) when the row was not in an expected state,
//! instead of reading and writing in two steps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deepcheck_core::models::{
    ClaimOutcome, CreditOutcome, DeductOutcome, DetectionJob, JobPolicy, MarkPaidOutcome,
    NewOrder, NewTokenPurchase, NewUpload, Order, OrderStatus, RedeemOutcome, TokenPurchase, Upload,
    UploadStatus, User,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    DetectionJobRepository, OrderRepository, PurchaseRepository, UploadRepository,
    UserRepository,
};
use crate::error::StorageResult;
use crate::memory::MemoryLedger;

#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn create_upload(&self, upload: NewUpload) -> StorageResult<Upload>;

    async fn get_upload(&self, id: Uuid) -> StorageResult<Option<Upload>>;

    async fn list_uploads(&self) -> StorageResult<Vec<Upload>>;

    async fn set_upload_status(&self, id: Uuid, status: UploadStatus) -> StorageResult<bool>;

    async fn set_upload_data(&self, id: Uuid, data: Vec<u8>) -> StorageResult<bool>;

    async fn get_upload_data(&self, id: Uuid) -> StorageResult<Option<Vec<u8>>>;

    async fn delete_upload(&self, id: Uuid) -> StorageResult<bool>;

    /// Marks `uploaded` rows created before `created_before` that no order references as
    /// `expired` and drops their payload. Returns the number of rows expired.
    async fn expire_orphaned_uploads(&self, created_before: DateTime<Utc>) -> StorageResult<u64>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order with status `awaiting_payment`, binding its uploads in the same
    /// write so the retention sweep can no longer expire them. Fails with
    /// [`StorageError::Conflict`] when any upload is missing or no longer `uploaded`.
    ///
    /// [`StorageError::Conflict`]: crate::StorageError::Conflict
    async fn create_order(&self, order: NewOrder) -> StorageResult<Order>;

    async fn get_order(&self, id: Uuid) -> StorageResult<Option<Order>>;

    async fn get_order_by_payment_ref(&self, reference: &str) -> StorageResult<Option<Order>>;

    async fn list_orders(&self) -> StorageResult<Vec<Order>>;

    /// Newest first.
    async fn list_orders_for_user(&self, user_id: Uuid, limit: i64) -> StorageResult<Vec<Order>>;

    /// Unconditional status write. Lifecycle code uses [`OrderStore::transition_status`].
    async fn update_order_status(&self, id: Uuid, status: OrderStatus)
        -> StorageResult<Option<Order>>;

    async fn set_order_payment_ref(&self, id: Uuid, reference: &str)
        -> StorageResult<Option<Order>>;

    async fn set_order_result(&self, id: Uuid, result: serde_json::Value)
        -> StorageResult<Option<Order>>;

    /// Binds `user_id` if the order has no owner yet. `None` if the order does not exist.
    async fn update_order_user(&self, id: Uuid, user_id: Uuid)
        -> StorageResult<Option<ClaimOutcome>>;

    /// Moves the order to `to` only if its current status is one of `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> StorageResult<Option<Order>>;

    /// Records `reference` and moves the order to `payment_pending` in one write, if the order
    /// still accepts payment.
    async fn begin_checkout(&self, id: Uuid, reference: &str) -> StorageResult<Option<Order>>;

    /// Moves a payable order to `paid` and records its detection job atomically.
    async fn mark_paid(
        &self,
        id: Uuid,
        reference: &str,
        policy: JobPolicy,
    ) -> StorageResult<Option<MarkPaidOutcome>>;

    /// Token-rail settlement. Redeems the prepaid funding of every upload in the order for
    /// `payer` and marks the order paid with its detection job, all in one transaction. Each
    /// upload's funding settles at most one order.
    async fn redeem_prepaid_uploads(
        &self,
        id: Uuid,
        reference: &str,
        payer: Uuid,
        policy: JobPolicy,
    ) -> StorageResult<Option<RedeemOutcome>>;

    /// Stores the result and moves `processing → completed` in one write.
    async fn complete_order(&self, id: Uuid, result: serde_json::Value)
        -> StorageResult<Option<Order>>;

    /// `paid → processing`. Only one caller wins.
    async fn begin_processing(&self, id: Uuid) -> StorageResult<Option<Order>> {
        self.transition_status(id, &[OrderStatus::Paid], OrderStatus::Processing)
            .await
    }

    /// `processing → paid`, handing the order back for another detection attempt.
    async fn release_processing(&self, id: Uuid) -> StorageResult<Option<Order>> {
        self.transition_status(id, &[OrderStatus::Processing], OrderStatus::Paid)
            .await
    }

    async fn fail_order(&self, id: Uuid) -> StorageResult<Option<Order>> {
        self.transition_status(
            id,
            &OrderStatus::predecessors(OrderStatus::Failed),
            OrderStatus::Failed,
        )
        .await
    }

    async fn cancel_order(&self, id: Uuid) -> StorageResult<Option<Order>> {
        self.transition_status(
            id,
            &OrderStatus::predecessors(OrderStatus::Cancelled),
            OrderStatus::Cancelled,
        )
        .await
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> StorageResult<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    /// Returns the existing user or inserts one with `initial_tokens`.
    async fn create_user_if_absent(&self, email: &str, initial_tokens: i64) -> StorageResult<User>;

    /// Raises the balance to `floor` if it is below it.
    async fn top_up_to_floor(&self, id: Uuid, floor: i64) -> StorageResult<Option<User>>;

    /// Conditional decrement: succeeds only if the balance covers `amount`.
    async fn deduct_tokens(&self, id: Uuid, amount: i64) -> StorageResult<Option<DeductOutcome>>;

    async fn credit_tokens(&self, id: Uuid, amount: i64) -> StorageResult<Option<User>>;
}

#[async_trait]
pub trait PurchaseStore: Send + Sync {
    async fn create_purchase(&self, purchase: NewTokenPurchase) -> StorageResult<TokenPurchase>;

    async fn get_purchase(&self, reference: &str) -> StorageResult<Option<TokenPurchase>>;

    /// Inserts the purchase if unknown, then credits it exactly once: `pending → credited`
    /// and the user's balance increase commit together.
    async fn credit_purchase(&self, purchase: NewTokenPurchase) -> StorageResult<CreditOutcome>;

    async fn fail_purchase(&self, reference: &str) -> StorageResult<Option<TokenPurchase>>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Records a job unless the order already has a live one.
    async fn enqueue_detection(
        &self,
        order_id: Uuid,
        policy: JobPolicy,
    ) -> StorageResult<Option<DetectionJob>>;

    async fn get_job(&self, id: Uuid) -> StorageResult<Option<DetectionJob>>;

    async fn active_job_for_order(&self, order_id: Uuid) -> StorageResult<Option<DetectionJob>>;

    /// Claims the oldest runnable job and marks it `running`.
    async fn claim_next_job(&self) -> StorageResult<Option<DetectionJob>>;

    async fn complete_job(&self, id: Uuid) -> StorageResult<()>;

    async fn fail_job(&self, id: Uuid, error: &str) -> StorageResult<()>;

    async fn schedule_retry(
        &self,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> StorageResult<Option<DetectionJob>>;

    /// Reschedules (or fails, once retries are exhausted) jobs left `running` longer than their
    /// timeout plus `grace_seconds`, releasing their orders from `processing`.
    async fn reap_stale_jobs(&self, grace_seconds: i64) -> StorageResult<u64>;
}

/// All ledger stores behind one handle.
#[derive(Clone)]
pub struct Ledger {
    pub uploads: Arc<dyn UploadStore>,
    pub orders: Arc<dyn OrderStore>,
    pub users: Arc<dyn UserStore>,
    pub purchases: Arc<dyn PurchaseStore>,
    pub jobs: Arc<dyn JobStore>,
    pool: Option<PgPool>,
}

impl Ledger {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            uploads: Arc::new(UploadRepository::new(pool.clone())),
            orders: Arc::new(OrderRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool.clone())),
            purchases: Arc::new(PurchaseRepository::new(pool.clone())),
            jobs: Arc::new(DetectionJobRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryLedger::new()))
    }

    pub fn from_memory(memory: Arc<MemoryLedger>) -> Self {
        Self {
            uploads: memory.clone(),
            orders: memory.clone(),
            users: memory.clone(),
            purchases: memory.clone(),
            jobs: memory,
            pool: None,
        }
    }

    /// Postgres pool, when the ledger is database-backed.
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    pub async fn ping(&self) -> StorageResult<()> {
        if let Some(ref pool) = self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

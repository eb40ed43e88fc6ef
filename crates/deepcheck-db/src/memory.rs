//! In-memory ledger
//!
//! Implements every store trait over a single mutex, so each operation is atomic exactly like
//! its Postgres counterpart. Used by tests and local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deepcheck_core::models::{
    ClaimOutcome, CreditOutcome, DeductOutcome, DetectionJob, JobPolicy, JobStatus,
    MarkPaidOutcome, NewOrder, NewTokenPurchase, NewUpload, Order, OrderStatus, PurchaseStatus,
    RedeemOutcome, TokenPurchase, Upload, UploadStatus, User,
};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::traits::{JobStore, OrderStore, PurchaseStore, UploadStore, UserStore};

#[derive(Default)]
struct MemoryState {
    // Insertion order doubles as creation order for newest-first listings.
    uploads: Vec<(Upload, Option<Vec<u8>>)>,
    orders: Vec<Order>,
    users: HashMap<Uuid, User>,
    purchases: HashMap<String, TokenPurchase>,
    jobs: Vec<DetectionJob>,
    // upload id -> order its prepaid funding settled
    redeemed: HashMap<Uuid, Uuid>,
}

impl MemoryState {
    fn order_mut(&mut self, id: Uuid) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    fn upload_mut(&mut self, id: Uuid) -> Option<&mut (Upload, Option<Vec<u8>>)> {
        self.uploads.iter_mut().find(|(u, _)| u.id == id)
    }

    fn job_mut(&mut self, id: Uuid) -> Option<&mut DetectionJob> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    fn has_active_job(&self, order_id: Uuid) -> bool {
        self.jobs
            .iter()
            .any(|j| j.order_id == order_id && j.status.is_active())
    }

    fn insert_job(&mut self, order_id: Uuid, policy: JobPolicy) -> Option<DetectionJob> {
        if self.has_active_job(order_id) {
            return None;
        }
        let now = Utc::now();
        let job = DetectionJob {
            id: Uuid::new_v4(),
            order_id,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: policy.max_retries,
            timeout_seconds: policy.timeout_seconds,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.push(job.clone());
        Some(job)
    }

    fn upload_is_available(&self, id: Uuid) -> bool {
        self.uploads
            .iter()
            .any(|(u, _)| u.id == id && u.status == UploadStatus::Uploaded)
    }

    fn set_order_status(&mut self, id: Uuid, status: OrderStatus) -> Option<Order> {
        let order = self.order_mut(id)?;
        order.status = status;
        order.updated_at = Utc::now();
        Some(order.clone())
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored uploads, regardless of status.
    pub async fn upload_count(&self) -> usize {
        self.state.lock().await.uploads.len()
    }

    pub async fn jobs(&self) -> Vec<DetectionJob> {
        self.state.lock().await.jobs.clone()
    }
}

#[async_trait]
impl UploadStore for MemoryLedger {
    async fn create_upload(&self, upload: NewUpload) -> StorageResult<Upload> {
        if !upload.metadata.is_object() {
            return Err(StorageError::Integrity(
                "upload metadata must be a JSON object".to_string(),
            ));
        }
        let record = Upload {
            id: Uuid::new_v4(),
            filename: upload.filename,
            size: upload.size,
            mime: upload.mime,
            status: UploadStatus::Uploaded,
            metadata: upload.metadata,
            created_at: Utc::now(),
        };
        self.state.lock().await.uploads.push((record.clone(), None));
        Ok(record)
    }

    async fn get_upload(&self, id: Uuid) -> StorageResult<Option<Upload>> {
        let state = self.state.lock().await;
        Ok(state
            .uploads
            .iter()
            .find(|(u, _)| u.id == id)
            .map(|(u, _)| u.clone()))
    }

    async fn list_uploads(&self) -> StorageResult<Vec<Upload>> {
        let state = self.state.lock().await;
        Ok(state.uploads.iter().rev().map(|(u, _)| u.clone()).collect())
    }

    async fn set_upload_status(&self, id: Uuid, status: UploadStatus) -> StorageResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .upload_mut(id)
            .map(|(u, _)| u.status = status)
            .is_some())
    }

    async fn set_upload_data(&self, id: Uuid, data: Vec<u8>) -> StorageResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .upload_mut(id)
            .map(|(_, payload)| *payload = Some(data))
            .is_some())
    }

    async fn get_upload_data(&self, id: Uuid) -> StorageResult<Option<Vec<u8>>> {
        let state = self.state.lock().await;
        Ok(state
            .uploads
            .iter()
            .find(|(u, _)| u.id == id)
            .and_then(|(_, payload)| payload.clone()))
    }

    async fn delete_upload(&self, id: Uuid) -> StorageResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.uploads.len();
        state.uploads.retain(|(u, _)| u.id != id);
        Ok(state.uploads.len() < before)
    }

    async fn expire_orphaned_uploads(&self, created_before: DateTime<Utc>) -> StorageResult<u64> {
        let mut state = self.state.lock().await;
        let referenced: Vec<Uuid> = state
            .orders
            .iter()
            .flat_map(|o| o.upload_ids.iter().copied())
            .collect();
        let mut expired = 0;
        for (upload, payload) in state.uploads.iter_mut() {
            if upload.status == UploadStatus::Uploaded
                && upload.created_at < created_before
                && !referenced.contains(&upload.id)
            {
                upload.status = UploadStatus::Expired;
                *payload = None;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl OrderStore for MemoryLedger {
    async fn create_order(&self, order: NewOrder) -> StorageResult<Order> {
        let mut state = self.state.lock().await;
        if !order.upload_ids.iter().all(|id| state.upload_is_available(*id)) {
            return Err(StorageError::Conflict(
                "One or more uploads are no longer available".to_string(),
            ));
        }
        let now = Utc::now();
        let record = Order {
            id: Uuid::new_v4(),
            upload_ids: order.upload_ids,
            user_id: order.user_id,
            total_amount_cents: order.total_amount_cents,
            currency: order.currency,
            status: OrderStatus::AwaitingPayment,
            payment_ref: None,
            notes: order.notes,
            result: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.push(record.clone());
        Ok(record)
    }

    async fn get_order(&self, id: Uuid) -> StorageResult<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn get_order_by_payment_ref(&self, reference: &str) -> StorageResult<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .find(|o| o.payment_ref.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_orders(&self) -> StorageResult<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().rev().cloned().collect())
    }

    async fn list_orders_for_user(&self, user_id: Uuid, limit: i64) -> StorageResult<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == Some(user_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> StorageResult<Option<Order>> {
        Ok(self.state.lock().await.set_order_status(id, status))
    }

    async fn set_order_payment_ref(
        &self,
        id: Uuid,
        reference: &str,
    ) -> StorageResult<Option<Order>> {
        let mut state = self.state.lock().await;
        Ok(state.order_mut(id).map(|order| {
            order.payment_ref = Some(reference.to_string());
            order.updated_at = Utc::now();
            order.clone()
        }))
    }

    async fn set_order_result(
        &self,
        id: Uuid,
        result: serde_json::Value,
    ) -> StorageResult<Option<Order>> {
        let mut state = self.state.lock().await;
        Ok(state.order_mut(id).map(|order| {
            order.result = Some(result);
            order.updated_at = Utc::now();
            order.clone()
        }))
    }

    async fn update_order_user(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<Option<ClaimOutcome>> {
        let mut state = self.state.lock().await;
        Ok(state.order_mut(id).map(|order| match order.user_id {
            None => {
                order.user_id = Some(user_id);
                order.updated_at = Utc::now();
                ClaimOutcome::Claimed(order.clone())
            }
            Some(owner) if owner == user_id => ClaimOutcome::AlreadyOwned(order.clone()),
            Some(_) => ClaimOutcome::OwnedByOther(order.clone()),
        }))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> StorageResult<Option<Order>> {
        let mut state = self.state.lock().await;
        let matches = state
            .orders
            .iter()
            .any(|o| o.id == id && from.contains(&o.status));
        if !matches {
            return Ok(None);
        }
        Ok(state.set_order_status(id, to))
    }

    async fn begin_checkout(&self, id: Uuid, reference: &str) -> StorageResult<Option<Order>> {
        let mut state = self.state.lock().await;
        Ok(state
            .order_mut(id)
            .filter(|o| o.status.accepts_payment())
            .map(|order| {
                order.payment_ref = Some(reference.to_string());
                order.status = OrderStatus::PaymentPending;
                order.updated_at = Utc::now();
                order.clone()
            }))
    }

    async fn mark_paid(
        &self,
        id: Uuid,
        reference: &str,
        policy: JobPolicy,
    ) -> StorageResult<Option<MarkPaidOutcome>> {
        let mut state = self.state.lock().await;
        let Some(order) = state.order_mut(id) else {
            return Ok(None);
        };

        if order.status.is_paid_or_later() {
            return Ok(Some(MarkPaidOutcome::AlreadyPaid(order.clone())));
        }
        if !order.status.accepts_payment() {
            return Ok(Some(MarkPaidOutcome::NotPayable(order.clone())));
        }

        order.status = OrderStatus::Paid;
        order.payment_ref = Some(reference.to_string());
        order.updated_at = Utc::now();
        let paid = order.clone();
        state.insert_job(id, policy);
        Ok(Some(MarkPaidOutcome::Transitioned(paid)))
    }

    async fn redeem_prepaid_uploads(
        &self,
        id: Uuid,
        reference: &str,
        payer: Uuid,
        policy: JobPolicy,
    ) -> StorageResult<Option<RedeemOutcome>> {
        let mut state = self.state.lock().await;
        let Some(order) = state.orders.iter().find(|o| o.id == id).cloned() else {
            return Ok(None);
        };

        if order.status.is_paid_or_later() {
            return Ok(Some(RedeemOutcome::Paid(MarkPaidOutcome::AlreadyPaid(order))));
        }
        if !order.status.accepts_payment() {
            return Ok(Some(RedeemOutcome::Paid(MarkPaidOutcome::NotPayable(order))));
        }

        let redeemable = !order.upload_ids.is_empty()
            && order.upload_ids.iter().all(|upload_id| {
                let prepaid = state.uploads.iter().any(|(u, _)| {
                    u.id == *upload_id
                        && u.status == UploadStatus::Uploaded
                        && u.funding().is_prepaid_by(payer)
                });
                let spent = matches!(state.redeemed.get(upload_id), Some(other) if *other != id);
                prepaid && !spent
            });
        if !redeemable {
            return Ok(Some(RedeemOutcome::FundingUnavailable(order)));
        }

        for upload_id in &order.upload_ids {
            state.redeemed.insert(*upload_id, id);
        }
        let Some(order) = state.order_mut(id) else {
            return Ok(None);
        };
        order.status = OrderStatus::Paid;
        order.payment_ref = Some(reference.to_string());
        order.updated_at = Utc::now();
        let paid = order.clone();
        state.insert_job(id, policy);
        Ok(Some(RedeemOutcome::Paid(MarkPaidOutcome::Transitioned(paid))))
    }

    async fn complete_order(
        &self,
        id: Uuid,
        result: serde_json::Value,
    ) -> StorageResult<Option<Order>> {
        let mut state = self.state.lock().await;
        Ok(state
            .order_mut(id)
            .filter(|o| o.status == OrderStatus::Processing)
            .map(|order| {
                order.result = Some(result);
                order.status = OrderStatus::Completed;
                order.updated_at = Utc::now();
                order.clone()
            }))
    }
}

#[async_trait]
impl UserStore for MemoryLedger {
    async fn get_user(&self, id: Uuid) -> StorageResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user_if_absent(&self, email: &str, initial_tokens: i64) -> StorageResult<User> {
        let email = email.trim().to_lowercase();
        let mut state = self.state.lock().await;
        if let Some(existing) = state.users.values().find(|u| u.email == email) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            tokens: initial_tokens.max(0),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn top_up_to_floor(&self, id: Uuid, floor: i64) -> StorageResult<Option<User>> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(&id).map(|user| {
            if user.tokens < floor {
                user.tokens = floor;
                user.updated_at = Utc::now();
            }
            user.clone()
        }))
    }

    async fn deduct_tokens(&self, id: Uuid, amount: i64) -> StorageResult<Option<DeductOutcome>> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(&id).map(|user| {
            if user.tokens >= amount {
                user.tokens -= amount;
                user.updated_at = Utc::now();
                DeductOutcome::Deducted {
                    remaining: user.tokens,
                }
            } else {
                DeductOutcome::Insufficient {
                    available: user.tokens,
                }
            }
        }))
    }

    async fn credit_tokens(&self, id: Uuid, amount: i64) -> StorageResult<Option<User>> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(&id).map(|user| {
            user.tokens += amount;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

#[async_trait]
impl PurchaseStore for MemoryLedger {
    async fn create_purchase(&self, purchase: NewTokenPurchase) -> StorageResult<TokenPurchase> {
        let mut state = self.state.lock().await;
        if state.purchases.contains_key(&purchase.reference) {
            return Err(StorageError::Integrity(format!(
                "duplicate purchase reference {}",
                purchase.reference
            )));
        }
        let now = Utc::now();
        let record = TokenPurchase {
            reference: purchase.reference,
            user_id: purchase.user_id,
            tokens: purchase.tokens,
            amount_cents: purchase.amount_cents,
            status: PurchaseStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state
            .purchases
            .insert(record.reference.clone(), record.clone());
        Ok(record)
    }

    async fn get_purchase(&self, reference: &str) -> StorageResult<Option<TokenPurchase>> {
        Ok(self.state.lock().await.purchases.get(reference).cloned())
    }

    async fn credit_purchase(&self, purchase: NewTokenPurchase) -> StorageResult<CreditOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Utc::now();
        let record = state
            .purchases
            .entry(purchase.reference.clone())
            .or_insert_with(|| TokenPurchase {
                reference: purchase.reference.clone(),
                user_id: purchase.user_id,
                tokens: purchase.tokens,
                amount_cents: purchase.amount_cents,
                status: PurchaseStatus::Pending,
                created_at: now,
                updated_at: now,
            });

        match record.status {
            PurchaseStatus::Credited => return Ok(CreditOutcome::AlreadyCredited(record.clone())),
            PurchaseStatus::Failed => return Ok(CreditOutcome::Rejected(record.clone())),
            PurchaseStatus::Pending => {}
        }

        let Some(user) = state.users.get_mut(&record.user_id) else {
            return Err(StorageError::Integrity(format!(
                "purchase {} references unknown user {}",
                record.reference, record.user_id
            )));
        };
        record.status = PurchaseStatus::Credited;
        record.updated_at = now;
        user.tokens += record.tokens;
        user.updated_at = now;

        Ok(CreditOutcome::Credited {
            purchase: record.clone(),
            user: user.clone(),
        })
    }

    async fn fail_purchase(&self, reference: &str) -> StorageResult<Option<TokenPurchase>> {
        let mut state = self.state.lock().await;
        Ok(state
            .purchases
            .get_mut(reference)
            .filter(|p| p.status == PurchaseStatus::Pending)
            .map(|p| {
                p.status = PurchaseStatus::Failed;
                p.updated_at = Utc::now();
                p.clone()
            }))
    }
}

#[async_trait]
impl JobStore for MemoryLedger {
    async fn enqueue_detection(
        &self,
        order_id: Uuid,
        policy: JobPolicy,
    ) -> StorageResult<Option<DetectionJob>> {
        Ok(self.state.lock().await.insert_job(order_id, policy))
    }

    async fn get_job(&self, id: Uuid) -> StorageResult<Option<DetectionJob>> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn active_job_for_order(&self, order_id: Uuid) -> StorageResult<Option<DetectionJob>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .find(|j| j.order_id == order_id && j.status.is_active())
            .cloned())
    }

    async fn claim_next_job(&self) -> StorageResult<Option<DetectionJob>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let next = state
            .jobs
            .iter_mut()
            .filter(|j| j.is_ready_to_run())
            .min_by_key(|j| j.scheduled_at);
        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(now);
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn complete_job(&self, id: Uuid) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.job_mut(id) {
            let now = Utc::now();
            job.status = JobStatus::Completed;
            job.completed_at = Some(now);
            job.last_error = None;
            job.updated_at = now;
        }
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.job_mut(id) {
            let now = Utc::now();
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            job.last_error = Some(error.to_string());
            job.updated_at = now;
        }
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> StorageResult<Option<DetectionJob>> {
        let mut state = self.state.lock().await;
        Ok(state.job_mut(id).map(|job| {
            job.status = JobStatus::Scheduled;
            job.retry_count += 1;
            job.scheduled_at = scheduled_at;
            job.started_at = None;
            job.last_error = Some(error.to_string());
            job.updated_at = Utc::now();
            job.clone()
        }))
    }

    async fn reap_stale_jobs(&self, grace_seconds: i64) -> StorageResult<u64> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut released = Vec::new();
        for job in state.jobs.iter_mut() {
            let Some(started_at) = job.started_at else {
                continue;
            };
            let deadline = started_at
                + Duration::seconds(i64::from(job.timeout_seconds) + grace_seconds);
            if job.status != JobStatus::Running || deadline >= now {
                continue;
            }
            let can_retry = job.can_retry();
            if can_retry {
                job.status = JobStatus::Scheduled;
                job.retry_count += 1;
                job.completed_at = None;
            } else {
                job.status = JobStatus::Failed;
                job.completed_at = Some(now);
            }
            job.scheduled_at = now;
            job.started_at = None;
            job.last_error = Some("job exceeded its timeout".to_string());
            job.updated_at = now;
            released.push((job.order_id, can_retry));
        }

        for (order_id, can_retry) in &released {
            if let Some(order) = state.order_mut(*order_id) {
                if order.status == OrderStatus::Processing {
                    order.status = if *can_retry {
                        OrderStatus::Paid
                    } else {
                        OrderStatus::Failed
                    };
                    order.updated_at = now;
                }
            }
        }
        Ok(released.len() as u64)
    }
}

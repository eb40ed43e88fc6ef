//! Token accounting: user resolution, demo top-up, deductions and credits.

use deepcheck_core::models::{DeductOutcome, User};
use deepcheck_core::{AppError, DemoPolicy};
use deepcheck_db::UserStore;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct TokenAccounts {
    users: Arc<dyn UserStore>,
    demo: DemoPolicy,
}

impl TokenAccounts {
    pub fn new(users: Arc<dyn UserStore>, demo: DemoPolicy) -> Self {
        Self { users, demo }
    }

    pub fn is_demo_account(&self, email: &str) -> bool {
        self.demo.is_demo_account(email)
    }

    /// Returns the user for `email`, creating it on first sight. Demo accounts start at the
    /// floor and are raised back to it on every call.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create_user(&self, email: &str) -> Result<User, AppError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AppError::InvalidRequest("Email is required".to_string()));
        }

        let user = self
            .users
            .create_user_if_absent(&email, self.demo.initial_balance(&email))
            .await?;

        if self.demo.is_demo_account(&email) && user.tokens < self.demo.floor() {
            let topped_up = self
                .users
                .top_up_to_floor(user.id, self.demo.floor())
                .await?
                .ok_or_else(|| {
                    AppError::Integrity(format!("user {} vanished during top-up", user.id))
                })?;
            tracing::info!(
                user_id = %topped_up.id,
                tokens = topped_up.tokens,
                "Demo account topped up to floor"
            );
            return Ok(topped_up);
        }

        Ok(user)
    }

    /// Removes `amount` tokens. Returns the remaining balance.
    #[tracing::instrument(skip(self))]
    pub async fn deduct(&self, user_id: Uuid, amount: i64) -> Result<i64, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidRequest(
                "Deduction amount must be positive".to_string(),
            ));
        }

        match self.users.deduct_tokens(user_id, amount).await? {
            Some(DeductOutcome::Deducted { remaining }) => {
                tracing::debug!(%user_id, amount, remaining, "Tokens deducted");
                Ok(remaining)
            }
            Some(DeductOutcome::Insufficient { available }) => {
                Err(AppError::InsufficientTokens {
                    available,
                    required: amount,
                })
            }
            None => Err(AppError::NotFound(format!("User {} not found", user_id))),
        }
    }

    /// Adds `amount` tokens unconditionally. Replay protection belongs to the caller.
    #[tracing::instrument(skip(self))]
    pub async fn credit(&self, user_id: Uuid, amount: i64) -> Result<User, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidRequest(
                "Credit amount must be positive".to_string(),
            ));
        }
        self.users
            .credit_tokens(user_id, amount)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepcheck_db::MemoryLedger;

    fn accounts() -> TokenAccounts {
        TokenAccounts::new(
            Arc::new(MemoryLedger::new()),
            DemoPolicy::new(["demo@deepcheck.test"], 300),
        )
    }

    #[tokio::test]
    async fn test_new_user_starts_empty() {
        let accounts = accounts();
        let user = accounts.get_or_create_user("New@Example.com").await.unwrap();
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.tokens, 0);

        let again = accounts.get_or_create_user("new@example.com").await.unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn test_demo_account_is_topped_up() {
        let accounts = accounts();
        let user = accounts
            .get_or_create_user("demo@deepcheck.test")
            .await
            .unwrap();
        assert_eq!(user.tokens, 300);

        assert_eq!(accounts.deduct(user.id, 5).await.unwrap(), 295);
        let user = accounts
            .get_or_create_user("DEMO@deepcheck.test")
            .await
            .unwrap();
        assert_eq!(user.tokens, 300);
    }

    #[tokio::test]
    async fn test_deduct_reports_shortfall() {
        let accounts = accounts();
        let user = accounts.get_or_create_user("a@example.com").await.unwrap();
        accounts.credit(user.id, 2).await.unwrap();

        assert_eq!(accounts.deduct(user.id, 2).await.unwrap(), 0);
        match accounts.deduct(user.id, 1).await.unwrap_err() {
            AppError::InsufficientTokens {
                available,
                required,
            } => {
                assert_eq!(available, 0);
                assert_eq!(required, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_user_and_bad_amounts() {
        let accounts = accounts();
        assert!(matches!(
            accounts.deduct(Uuid::new_v4(), 1).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            accounts.credit(Uuid::new_v4(), 0).await,
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            accounts.get_or_create_user("  ").await,
            Err(AppError::InvalidRequest(_))
        ));
    }
}

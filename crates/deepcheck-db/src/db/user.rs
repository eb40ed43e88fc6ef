use async_trait::async_trait;
use deepcheck_core::models::{DeductOutcome, User};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::traits::UserStore;

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    #[tracing::instrument(skip(self))]
    async fn get_user(&self, id: Uuid) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<Postgres, User>(
            r#"
            SELECT id, email, tokens, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<Postgres, User>(
            r#"
            SELECT id, email, tokens, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    async fn create_user_if_absent(&self, email: &str, initial_tokens: i64) -> StorageResult<User> {
        let email = email.trim().to_lowercase();

        // The no-op update makes RETURNING yield the existing row on conflict.
        let user = sqlx::query_as::<Postgres, User>(
            r#"
            INSERT INTO users (id, email, tokens)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, tokens, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(initial_tokens.max(0))
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    async fn top_up_to_floor(&self, id: Uuid, floor: i64) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<Postgres, User>(
            r#"
            UPDATE users
            SET tokens = GREATEST(tokens, $2),
                updated_at = CASE WHEN tokens < $2 THEN NOW() ELSE updated_at END
            WHERE id = $1
            RETURNING id, email, tokens, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(floor)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    async fn deduct_tokens(&self, id: Uuid, amount: i64) -> StorageResult<Option<DeductOutcome>> {
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET tokens = tokens - $2, updated_at = NOW()
            WHERE id = $1 AND tokens >= $2
            RETURNING tokens
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(remaining) = remaining {
            tracing::debug!(user_id = %id, amount, remaining, "Tokens deducted");
            return Ok(Some(DeductOutcome::Deducted { remaining }));
        }

        let available: Option<i64> = sqlx::query_scalar("SELECT tokens FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(available.map(|available| DeductOutcome::Insufficient { available }))
    }

    #[tracing::instrument(skip(self))]
    async fn credit_tokens(&self, id: Uuid, amount: i64) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<Postgres, User>(
            r#"
            UPDATE users
            SET tokens = tokens + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, tokens, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

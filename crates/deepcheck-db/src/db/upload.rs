use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deepcheck_core::models::{NewUpload, Upload, UploadStatus};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::traits::UploadStore;

#[derive(sqlx::FromRow)]
struct UploadRow {
    id: Uuid,
    filename: String,
    size: i64,
    mime: String,
    status: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<UploadRow> for Upload {
    type Error = StorageError;

    fn try_from(row: UploadRow) -> Result<Self, Self::Error> {
        let status: UploadStatus = row
            .status
            .parse()
            .map_err(|e| StorageError::integrity("upload", row.id, e))?;
        if !row.metadata.is_object() {
            return Err(StorageError::integrity(
                "upload",
                row.id,
                "metadata is not a JSON object",
            ));
        }
        Ok(Upload {
            id: row.id,
            filename: row.filename,
            size: row.size,
            mime: row.mime,
            status,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct UploadRepository {
    pool: PgPool,
}

impl UploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadStore for UploadRepository {
    #[tracing::instrument(skip(self, upload), fields(filename = %upload.filename))]
    async fn create_upload(&self, upload: NewUpload) -> StorageResult<Upload> {
        let row = sqlx::query_as::<Postgres, UploadRow>(
            r#"
            INSERT INTO uploads (id, filename, size, mime, status, metadata)
            VALUES ($1, $2, $3, $4, 'uploaded', $5)
            RETURNING id, filename, size, mime, status, metadata, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&upload.filename)
        .bind(upload.size)
        .bind(&upload.mime)
        .bind(&upload.metadata)
        .fetch_one(&self.pool)
        .await?;

        let upload = Upload::try_from(row)?;
        tracing::debug!(upload_id = %upload.id, "Upload record created");
        Ok(upload)
    }

    #[tracing::instrument(skip(self))]
    async fn get_upload(&self, id: Uuid) -> StorageResult<Option<Upload>> {
        let row = sqlx::query_as::<Postgres, UploadRow>(
            r#"
            SELECT id, filename, size, mime, status, metadata, created_at
            FROM uploads
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Upload::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_uploads(&self) -> StorageResult<Vec<Upload>> {
        let rows = sqlx::query_as::<Postgres, UploadRow>(
            r#"
            SELECT id, filename, size, mime, status, metadata, created_at
            FROM uploads
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Upload::try_from).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn set_upload_status(&self, id: Uuid, status: UploadStatus) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE uploads SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, data), fields(bytes = data.len()))]
    async fn set_upload_data(&self, id: Uuid, data: Vec<u8>) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE uploads SET data = $2 WHERE id = $1")
            .bind(id)
            .bind(data)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn get_upload_data(&self, id: Uuid) -> StorageResult<Option<Vec<u8>>> {
        let data: Option<Option<Vec<u8>>> =
            sqlx::query_scalar("SELECT data FROM uploads WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(data.flatten())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_upload(&self, id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM uploads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn expire_orphaned_uploads(&self, created_before: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE uploads u
            SET status = 'expired', data = NULL
            WHERE u.status = 'uploaded'
                AND u.created_at < $1
                AND NOT u.attached
                AND NOT EXISTS (
                    SELECT 1 FROM orders o
                    WHERE o.upload_ids @> jsonb_build_array(u.id::text)
                )
            "#,
        )
        .bind(created_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

use chrono::Utc;
use snapledger_core::models::{CaptureRecord, CaptureStatus};
use snapledger_core::AppError;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Optional fields carried along with a status transition.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    /// Replacement local path (the compression step writes a new file).
    pub local_path: Option<String>,
    pub object_key: Option<String>,
    pub compressed_size: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub error_message: Option<String>,
}

/// Repository for capture records.
///
/// `update_status` is the only mutation path for the status column, so the
/// state machine has exactly one source of truth after a crash.
#[derive(Clone)]
pub struct CaptureRepository {
    pool: SqlitePool,
}

impl CaptureRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &CaptureRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO capture_records (
                id, user_id, trace_id, action_id, status, local_path,
                object_key, content_hash, original_size, compressed_size,
                width, height, error_message, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.trace_id)
        .bind(record.action_id)
        .bind(record.status)
        .bind(&record.local_path)
        .bind(&record.object_key)
        .bind(&record.content_hash)
        .bind(record.original_size)
        .bind(record.compressed_size)
        .bind(record.width)
        .bind(record.height)
        .bind(&record.error_message)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CaptureRecord>, AppError> {
        let row = sqlx::query_as::<_, CaptureRecord>(
            "SELECT * FROM capture_records WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Find a non-skipped record with the given content hash for dedup.
    pub async fn find_by_content_hash(
        &self,
        user_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<CaptureRecord>, AppError> {
        let row = sqlx::query_as::<_, CaptureRecord>(
            r#"
            SELECT * FROM capture_records
            WHERE user_id = $1 AND content_hash = $2 AND status != 'skipped'
            "#,
        )
        .bind(user_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Transition a record's status, validating the move against the state
    /// machine. Replaying the same transition with identical extras is a
    /// no-op, not an error.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: CaptureStatus,
        extra: StatusUpdate,
    ) -> Result<CaptureRecord, AppError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<CaptureStatus> =
            sqlx::query("SELECT status FROM capture_records WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.try_get("status"))
                .transpose()?;

        let Some(current) = current else {
            return Err(AppError::NotFound(format!("Capture record {}", id)));
        };

        if !current.can_transition_to(status) {
            return Err(AppError::InvalidTransition {
                from: current.to_string(),
                to: status.to_string(),
            });
        }

        sqlx::query(
            r#"
            UPDATE capture_records SET
                status = $2,
                local_path = COALESCE($3, local_path),
                object_key = COALESCE($4, object_key),
                compressed_size = COALESCE($5, compressed_size),
                width = COALESCE($6, width),
                height = COALESCE($7, height),
                error_message = COALESCE($8, error_message),
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(&extra.local_path)
        .bind(&extra.object_key)
        .bind(extra.compressed_size)
        .bind(extra.width)
        .bind(extra.height)
        .bind(&extra.error_message)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Capture record {}", id)))
    }

    pub async fn list_by_status(
        &self,
        user_id: Uuid,
        status: CaptureStatus,
    ) -> Result<Vec<CaptureRecord>, AppError> {
        let rows = sqlx::query_as::<_, CaptureRecord>(
            r#"
            SELECT * FROM capture_records
            WHERE user_id = $1 AND status = $2
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Rewrite interrupted uploads back to `compressed`. Run once at
    /// startup; an upload caught mid-transfer is restarted, never resumed.
    pub async fn reset_interrupted(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE capture_records
            SET status = 'compressed', updated_at = $1
            WHERE status = 'uploading'
            "#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Explicit user removal; the only hard delete in the store.
    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM capture_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

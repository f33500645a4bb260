use snapledger_core::models::{SyncOp, SyncQueueEntry};
use snapledger_core::AppError;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Repository for the persisted offline push queue.
///
/// One row per transaction id: a re-enqueue replaces the earlier entry,
/// since the latest one carries the freshest intended write.
#[derive(Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, entry: &SyncQueueEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sync_queue (transaction_id, user_id, op, enqueued_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (transaction_id) DO UPDATE SET
                op = excluded.op,
                enqueued_at = excluded.enqueued_at
            "#,
        )
        .bind(entry.transaction_id)
        .bind(entry.user_id)
        .bind(entry.op)
        .bind(entry.enqueued_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Entries in enqueue order for draining.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<SyncQueueEntry>, AppError> {
        let rows = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            SELECT * FROM sync_queue
            WHERE user_id = $1
            ORDER BY enqueued_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn remove(&self, transaction_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sync_queue WHERE transaction_id = $1")
            .bind(transaction_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn len(&self, user_id: Uuid) -> Result<usize, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    /// Empty the queue (recovery `discard`).
    pub async fn clear(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Convenience for enqueueing an upsert of a dirty transaction.
    pub async fn enqueue_upsert(&self, user_id: Uuid, transaction_id: Uuid) -> Result<(), AppError> {
        self.enqueue(&SyncQueueEntry {
            transaction_id,
            user_id,
            op: SyncOp::Upsert,
            enqueued_at: chrono::Utc::now(),
        })
        .await
    }
}

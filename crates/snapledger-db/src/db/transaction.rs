use chrono::{DateTime, Utc};
use snapledger_core::models::{Transaction, TransactionStatus};
use snapledger_core::AppError;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Repository for synced transactions.
///
/// `upsert` is the single write path for transaction rows; both user edits
/// and pull merges go through it, which is what prevents lost updates when
/// the two race.
#[derive(Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, tx: &Transaction) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                user_id, transaction_id, payload, status, updated_at,
                confirmed_at, version, dirty
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, transaction_id) DO UPDATE SET
                payload = excluded.payload,
                status = excluded.status,
                updated_at = excluded.updated_at,
                confirmed_at = excluded.confirmed_at,
                version = excluded.version,
                dirty = excluded.dirty
            "#,
        )
        .bind(tx.user_id)
        .bind(tx.transaction_id)
        .bind(serde_json::to_string(&tx.payload)?)
        .bind(tx.status)
        .bind(tx.updated_at)
        .bind(tx.confirmed_at)
        .bind(tx.version)
        .bind(tx.dirty)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        let row = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE user_id = $1 AND transaction_id = $2",
        )
        .bind(user_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_dirty(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = $1 AND dirty = 1
            ORDER BY updated_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_dirty(&self, user_id: Uuid) -> Result<usize, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND dirty = 1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as usize)
    }

    pub async fn mark_clean(&self, user_id: Uuid, transaction_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE transactions SET dirty = 0 WHERE user_id = $1 AND transaction_id = $2",
        )
        .bind(user_id)
        .bind(transaction_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Clear every dirty flag for the user (recovery `discard`).
    pub async fn clear_all_dirty(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE transactions SET dirty = 0 WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Soft delete: flips status, bumps version, marks dirty for push.
    pub async fn soft_delete(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $3, updated_at = $4, version = version + 1, dirty = 1
            WHERE user_id = $1 AND transaction_id = $2
            "#,
        )
        .bind(user_id)
        .bind(transaction_id)
        .bind(TransactionStatus::Deleted)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

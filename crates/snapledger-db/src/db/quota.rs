use chrono::NaiveDate;
use snapledger_core::models::{UploadPermit, UsageCounters};
use snapledger_core::AppError;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Repository for the cached permit and usage counters.
#[derive(Clone)]
pub struct QuotaRepository {
    pool: SqlitePool,
}

impl QuotaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_permit(&self, user_id: Uuid) -> Result<Option<UploadPermit>, AppError> {
        let row = sqlx::query_as::<_, UploadPermit>(
            "SELECT * FROM upload_permits WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Replace the cached permit wholesale.
    pub async fn put_permit(&self, permit: &UploadPermit) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO upload_permits (
                user_id, total_limit, daily_rate, issued_at, expires_at, tier, signature
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                total_limit = excluded.total_limit,
                daily_rate = excluded.daily_rate,
                issued_at = excluded.issued_at,
                expires_at = excluded.expires_at,
                tier = excluded.tier,
                signature = excluded.signature
            "#,
        )
        .bind(permit.user_id)
        .bind(permit.total_limit)
        .bind(permit.daily_rate)
        .bind(permit.issued_at)
        .bind(permit.expires_at)
        .bind(&permit.tier)
        .bind(&permit.signature)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_permit(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM upload_permits WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Counters for the user; a user with no uploads yet reads as zeroes.
    pub async fn get_counters(&self, user_id: Uuid) -> Result<UsageCounters, AppError> {
        let row = sqlx::query_as::<_, UsageCounters>(
            "SELECT total_used, used_today, last_upload_date FROM usage_counters WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.unwrap_or_default())
    }

    /// Record one successful upload. A single upsert statement so the two
    /// counters can never drift apart, with the daily counter rolling over
    /// when the date changed.
    pub async fn record_upload(&self, user_id: Uuid, today: NaiveDate) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO usage_counters (user_id, total_used, used_today, last_upload_date)
            VALUES ($1, 1, 1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                total_used = total_used + 1,
                used_today = CASE
                    WHEN last_upload_date = $2 THEN used_today + 1
                    ELSE 1
                END,
                last_upload_date = $2
            "#,
        )
        .bind(user_id)
        .bind(today)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reset counters when a fresh permit is issued.
    pub async fn reset_counters(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM usage_counters WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

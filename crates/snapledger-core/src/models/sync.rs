use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Operation kind recorded in the offline sync queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum SyncOp {
    Upsert,
    Delete,
}

impl Display for SyncOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SyncOp::Upsert => write!(f, "upsert"),
            SyncOp::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for SyncOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(SyncOp::Upsert),
            "delete" => Ok(SyncOp::Delete),
            _ => Err(anyhow::anyhow!("Invalid sync op: {}", s)),
        }
    }
}

/// Persisted entry for a locally-dirty transaction awaiting push.
///
/// Deduplicated by transaction id: a re-enqueue replaces the previous entry,
/// since the latest one represents the freshest intended write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub op: SyncOp,
    pub enqueued_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for SyncQueueEntry {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(SyncQueueEntry {
            transaction_id: row.try_get("transaction_id")?,
            user_id: row.try_get("user_id")?,
            op: row.try_get("op")?,
            enqueued_at: row.try_get("enqueued_at")?,
        })
    }
}

/// Outcome of a pull: inserts are not conflicts, resolutions where the two
/// copies actually differed are.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PullSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub conflicts: usize,
}

/// Outcome of a push.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PushSummary {
    pub synced: usize,
    pub failed_ids: Vec<Uuid>,
    /// Ids parked in the offline queue because the store was unreachable.
    pub queued_offline: usize,
}

/// Startup recovery report.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RecoveryStatus {
    pub needs_recovery: bool,
    pub dirty_count: usize,
    pub queue_length: usize,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Soft-delete status of a transaction. Rows are never hard-deleted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Active,
    Deleted,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TransactionStatus::Active => write!(f, "active"),
            TransactionStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TransactionStatus::Active),
            "deleted" => Ok(TransactionStatus::Deleted),
            _ => Err(anyhow::anyhow!("Invalid transaction status: {}", s)),
        }
    }
}

/// Record subject to sync; exists both locally and in the remote store.
///
/// `dirty` is local-only and never leaves the device; `version` is a
/// monotonically increasing counter for optimistic concurrency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub user_id: Uuid,
    pub transaction_id: Uuid,
    /// Business payload (amounts, merchant, line items) as produced by the
    /// remote analysis pipeline or local confirmation edits.
    pub payload: serde_json::Value,
    pub status: TransactionStatus,
    pub updated_at: DateTime<Utc>,
    /// Set when a user manually accepted this transaction. Highest-authority
    /// signal in conflict resolution.
    pub confirmed_at: Option<DateTime<Utc>>,
    pub version: i64,
    /// Local-only; never serialized to the remote store.
    #[serde(skip)]
    pub dirty: bool,
}

impl Transaction {
    /// Whether `self` and `other` differ in any synced field. `dirty` is
    /// local bookkeeping and deliberately excluded.
    pub fn differs_from(&self, other: &Transaction) -> bool {
        self.payload != other.payload
            || self.status != other.status
            || self.updated_at != other.updated_at
            || self.confirmed_at != other.confirmed_at
            || self.version != other.version
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for Transaction {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let payload: String = row.try_get("payload")?;
        Ok(Transaction {
            user_id: row.try_get("user_id")?,
            transaction_id: row.try_get("transaction_id")?,
            payload: serde_json::from_str(&payload)
                .map_err(|e| sqlx::Error::ColumnDecode {
                    index: "payload".to_string(),
                    source: Box::new(e),
                })?,
            status: row.try_get("status")?,
            updated_at: row.try_get("updated_at")?,
            confirmed_at: row.try_get("confirmed_at")?,
            version: row.try_get("version")?,
            dirty: row.try_get("dirty")?,
        })
    }
}

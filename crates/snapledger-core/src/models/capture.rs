use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Processing status of a captured image.
///
/// `Uploading` is never a resumable state: on restart any record found in it
/// is rewritten to `Compressed` and the upload starts over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    Pending,
    Compressed,
    Uploading,
    Uploaded,
    Failed,
    Skipped,
}

impl CaptureStatus {
    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Replaying a status onto itself is always legal so that a crashed
    /// writer can safely repeat its last `update_status` call.
    pub fn can_transition_to(&self, next: CaptureStatus) -> bool {
        use CaptureStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (*self, next),
            (Pending, Compressed)
                | (Pending, Failed)
                | (Pending, Skipped)
                | (Compressed, Uploading)
                | (Compressed, Skipped)
                | (Compressed, Failed)
                | (Uploading, Uploaded)
                | (Uploading, Failed)
                | (Uploading, Compressed)
        )
    }

    /// Terminal states are never picked up by the upload queue again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureStatus::Uploaded | CaptureStatus::Failed | CaptureStatus::Skipped
        )
    }
}

impl Display for CaptureStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CaptureStatus::Pending => write!(f, "pending"),
            CaptureStatus::Compressed => write!(f, "compressed"),
            CaptureStatus::Uploading => write!(f, "uploading"),
            CaptureStatus::Uploaded => write!(f, "uploaded"),
            CaptureStatus::Failed => write!(f, "failed"),
            CaptureStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl FromStr for CaptureStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CaptureStatus::Pending),
            "compressed" => Ok(CaptureStatus::Compressed),
            "uploading" => Ok(CaptureStatus::Uploading),
            "uploaded" => Ok(CaptureStatus::Uploaded),
            "failed" => Ok(CaptureStatus::Failed),
            "skipped" => Ok(CaptureStatus::Skipped),
            _ => Err(anyhow::anyhow!("Invalid capture status: {}", s)),
        }
    }
}

/// One row per captured image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Correlation id carried through logs and remote calls.
    pub trace_id: Uuid,
    /// Idempotency key for upload retries.
    pub action_id: Uuid,
    pub status: CaptureStatus,
    pub local_path: String,
    /// Remote object key; set once the upload completes.
    pub object_key: Option<String>,
    /// Content hash used for duplicate detection (one per hash per user).
    pub content_hash: String,
    pub original_size: i64,
    pub compressed_size: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for CaptureRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(CaptureRecord {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            trace_id: row.try_get("trace_id")?,
            action_id: row.try_get("action_id")?,
            status: row.try_get("status")?,
            local_path: row.try_get("local_path")?,
            object_key: row.try_get("object_key")?,
            content_hash: row.try_get("content_hash")?,
            original_size: row.try_get("original_size")?,
            compressed_size: row.try_get("compressed_size")?,
            width: row.try_get("width")?,
            height: row.try_get("height")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(CaptureStatus::Pending.can_transition_to(CaptureStatus::Compressed));
        assert!(CaptureStatus::Compressed.can_transition_to(CaptureStatus::Uploading));
        assert!(CaptureStatus::Uploading.can_transition_to(CaptureStatus::Uploaded));
    }

    #[test]
    fn test_interrupted_upload_rewinds_to_compressed() {
        assert!(CaptureStatus::Uploading.can_transition_to(CaptureStatus::Compressed));
    }

    #[test]
    fn test_replaying_a_status_is_legal() {
        assert!(CaptureStatus::Uploaded.can_transition_to(CaptureStatus::Uploaded));
    }

    #[test]
    fn test_terminal_states_do_not_move_forward() {
        assert!(!CaptureStatus::Uploaded.can_transition_to(CaptureStatus::Pending));
        assert!(!CaptureStatus::Skipped.can_transition_to(CaptureStatus::Compressed));
        assert!(!CaptureStatus::Failed.can_transition_to(CaptureStatus::Uploading));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            CaptureStatus::Pending,
            CaptureStatus::Compressed,
            CaptureStatus::Uploading,
            CaptureStatus::Uploaded,
            CaptureStatus::Failed,
            CaptureStatus::Skipped,
        ] {
            assert_eq!(status.to_string().parse::<CaptureStatus>().unwrap(), status);
        }
    }
}

use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorClass;

/// Why the upload queue is paused.
///
/// `Network` pauses auto-resume on a reconnect signal; `Quota` and `Unknown`
/// require external resumption (a new permit, day rollover, or user action).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    Network,
    Quota,
    Unknown,
}

/// Upload queue status, one tagged state instead of boolean combinations so
/// "processing and paused simultaneously" cannot be represented.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum QueueState {
    Idle,
    Processing,
    Paused(PauseReason),
}

impl QueueState {
    pub fn is_paused(&self) -> bool {
        matches!(self, QueueState::Paused(_))
    }
}

/// Transient queue entry derived 1:1 from a capture record in `compressed`
/// state. Never persisted; the capture row is the durable source of truth.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub capture_id: Uuid,
    pub action_id: Uuid,
    pub correlation_id: Uuid,
    pub local_path: String,
    pub attempts: u32,
    pub last_error: Option<ErrorClass>,
}

impl UploadTask {
    pub fn new(capture_id: Uuid, action_id: Uuid, correlation_id: Uuid, local_path: String) -> Self {
        Self {
            capture_id,
            action_id,
            correlation_id,
            local_path,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Event emitted by the upload coordinator for downstream consumers.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Completed {
        capture_id: Uuid,
        object_key: String,
        correlation_id: Uuid,
    },
    Failed {
        capture_id: Uuid,
        class: ErrorClass,
    },
}

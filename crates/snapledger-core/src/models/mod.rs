pub mod capture;
pub mod permit;
pub mod sync;
pub mod transaction;
pub mod upload;

pub use capture::{CaptureRecord, CaptureStatus};
pub use permit::{QuotaStatus, UploadPermit, UsageCounters};
pub use sync::{PullSummary, PushSummary, RecoveryStatus, SyncOp, SyncQueueEntry};
pub use transaction::{Transaction, TransactionStatus};
pub use upload::{PauseReason, QueueState, UploadEvent, UploadTask};

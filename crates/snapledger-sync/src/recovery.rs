//! Startup recovery: report leftover state from a prior session and offer
//! exactly two ways out.
//!
//! Runs before any other component starts processing. Recovery is signaled
//! when dirty transactions or parked queue entries survived a crash or an
//! offline shutdown. The caller either resumes (a full sync) or discards
//! (accepts the remote state as authoritative). There is deliberately no
//! partial-merge third option.

use std::sync::Arc;

use uuid::Uuid;

use snapledger_core::models::RecoveryStatus;
use snapledger_core::AppError;
use snapledger_db::{SyncQueueRepository, TransactionRepository};

use crate::sync::{SyncCoordinator, SyncReport};

pub struct RecoveryService {
    user_id: Uuid,
    transactions: TransactionRepository,
    queue: SyncQueueRepository,
    sync: Arc<SyncCoordinator>,
}

impl RecoveryService {
    pub fn new(
        user_id: Uuid,
        transactions: TransactionRepository,
        queue: SyncQueueRepository,
        sync: Arc<SyncCoordinator>,
    ) -> Self {
        Self {
            user_id,
            transactions,
            queue,
            sync,
        }
    }

    #[tracing::instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn check_recovery_status(&self) -> Result<RecoveryStatus, AppError> {
        let dirty_count = self.transactions.count_dirty(self.user_id).await?;
        let queue_length = self.queue.len(self.user_id).await?;
        let status = RecoveryStatus {
            needs_recovery: dirty_count > 0 || queue_length > 0,
            dirty_count,
            queue_length,
        };
        if status.needs_recovery {
            tracing::info!(
                dirty = dirty_count,
                queued = queue_length,
                "Unfinished work from a prior session"
            );
        }
        Ok(status)
    }

    /// Resume: run a full sync immediately.
    pub async fn resume(&self) -> Result<SyncReport, AppError> {
        self.sync.sync().await
    }

    /// Discard: clear every dirty flag and empty the offline queue. Local
    /// unsynced edits are lost; the remote state becomes authoritative.
    #[tracing::instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn discard(&self) -> Result<(u64, u64), AppError> {
        let cleared = self.transactions.clear_all_dirty(self.user_id).await?;
        let dropped = self.queue.clear(self.user_id).await?;
        tracing::info!(cleared = cleared, dropped = dropped, "Recovery state discarded");
        Ok((cleared, dropped))
    }
}

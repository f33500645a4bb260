//! Sync coordinator: pull/push against the remote transaction store.
//!
//! `sync()` is pull-then-push, strictly sequential. Pulling first minimizes
//! false conflicts against remote updates that already happened. The remote
//! push endpoint applies conditional writes (accept only if the remote copy
//! is absent or older), so a crashed push can be retried blindly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use snapledger_client::{TransactionFetchRequest, TransactionGateway};
use snapledger_core::models::{PullSummary, PushSummary, SyncOp, SyncQueueEntry, TransactionStatus};
use snapledger_core::resolution::{resolve, Resolution};
use snapledger_core::{constants, AppError, ErrorClass};
use snapledger_db::{SyncQueueRepository, TransactionRepository};

/// Combined outcome of a full `sync()` run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub pull: PullSummary,
    pub push: PushSummary,
}

pub struct SyncCoordinator {
    user_id: Uuid,
    transactions: TransactionRepository,
    queue: SyncQueueRepository,
    gateway: Arc<dyn TransactionGateway>,
}

impl SyncCoordinator {
    pub fn new(
        user_id: Uuid,
        transactions: TransactionRepository,
        queue: SyncQueueRepository,
        gateway: Arc<dyn TransactionGateway>,
    ) -> Arc<Self> {
        Arc::new(Self {
            user_id,
            transactions,
            queue,
            gateway,
        })
    }

    /// Pull first, push second.
    #[tracing::instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn sync(&self) -> Result<SyncReport, AppError> {
        let pull = self.pull(None, None).await?;
        let push = self.push().await?;
        Ok(SyncReport { pull, push })
    }

    /// Fetch remote transactions and merge each into the local table.
    ///
    /// A remote row with no local copy is inserted as-is. When both copies
    /// exist and actually differ, the resolved winner is written and the
    /// conflict counter moves; identical copies are skipped entirely, so
    /// replaying a pull reports zero conflicts.
    #[tracing::instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn pull(
        &self,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<PullSummary, AppError> {
        let remote = self
            .gateway
            .fetch_transactions(&TransactionFetchRequest {
                user_id: self.user_id,
                date_from,
                date_to,
            })
            .await?;

        let mut summary = PullSummary {
            fetched: remote.len(),
            ..Default::default()
        };
        if remote.len() > constants::PULL_UNPAGINATED_WARN_THRESHOLD {
            tracing::warn!(
                fetched = remote.len(),
                threshold = constants::PULL_UNPAGINATED_WARN_THRESHOLD,
                "Unpaginated pull fetched more rows than the design assumes"
            );
        }

        for mut incoming in remote {
            incoming.dirty = false;
            match self
                .transactions
                .get(self.user_id, incoming.transaction_id)
                .await?
            {
                None => {
                    self.transactions.upsert(&incoming).await?;
                    summary.inserted += 1;
                }
                Some(local) => {
                    if !local.differs_from(&incoming) {
                        continue;
                    }
                    summary.conflicts += 1;
                    match resolve(&local, &incoming) {
                        Resolution::RemoteWins => {
                            self.transactions.upsert(&incoming).await?;
                            summary.updated += 1;
                        }
                        Resolution::LocalWins => {
                            tracing::debug!(
                                transaction_id = %incoming.transaction_id,
                                "Local copy kept over remote update"
                            );
                        }
                    }
                }
            }
        }

        tracing::info!(
            fetched = summary.fetched,
            inserted = summary.inserted,
            updated = summary.updated,
            conflicts = summary.conflicts,
            "Pull completed"
        );
        Ok(summary)
    }

    /// Push every dirty transaction in one batch.
    ///
    /// On success each accepted id is marked clean and dropped from the
    /// offline queue; ids the store rejected stay dirty for the next run.
    /// A network failure parks every id in the persisted queue instead.
    #[tracing::instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn push(&self) -> Result<PushSummary, AppError> {
        let dirty = self.transactions.list_dirty(self.user_id).await?;
        if dirty.is_empty() {
            return Ok(PushSummary::default());
        }

        let response = match self.gateway.push_transactions(self.user_id, &dirty).await {
            Ok(response) => response,
            Err(e) if e.class() == ErrorClass::Network => {
                let queued = self.park_offline(&dirty).await?;
                tracing::info!(queued = queued, "Store unreachable, push parked offline");
                return Ok(PushSummary {
                    queued_offline: queued,
                    ..Default::default()
                });
            }
            Err(e) => return Err(e),
        };

        let mut summary = PushSummary {
            failed_ids: response.failed_ids.clone(),
            ..Default::default()
        };
        for tx in &dirty {
            if response.failed_ids.contains(&tx.transaction_id) {
                continue;
            }
            self.transactions
                .mark_clean(self.user_id, tx.transaction_id)
                .await?;
            self.queue.remove(tx.transaction_id).await?;
            summary.synced += 1;
        }

        tracing::info!(
            synced = summary.synced,
            failed = summary.failed_ids.len(),
            "Push completed"
        );
        Ok(summary)
    }

    /// Drain the persisted offline queue in enqueue order, one entry at a
    /// time. Stops at the first network failure and leaves the rest parked.
    #[tracing::instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn drain_offline_queue(&self) -> Result<PushSummary, AppError> {
        let entries = self.queue.list(self.user_id).await?;
        let mut summary = PushSummary::default();

        for entry in entries {
            let Some(tx) = self
                .transactions
                .get(self.user_id, entry.transaction_id)
                .await?
            else {
                // The record is gone; the entry is stale.
                self.queue.remove(entry.transaction_id).await?;
                continue;
            };
            if !tx.dirty {
                self.queue.remove(entry.transaction_id).await?;
                continue;
            }

            let batch = [tx];
            match self.gateway.push_transactions(self.user_id, &batch).await {
                Ok(response) => {
                    self.queue.remove(entry.transaction_id).await?;
                    if response.failed_ids.contains(&entry.transaction_id) {
                        // Rejected by the conditional write; the next pull
                        // reconciles it.
                        summary.failed_ids.push(entry.transaction_id);
                    } else {
                        self.transactions
                            .mark_clean(self.user_id, entry.transaction_id)
                            .await?;
                        summary.synced += 1;
                    }
                }
                Err(e) if e.class() == ErrorClass::Network => {
                    tracing::info!(
                        transaction_id = %entry.transaction_id,
                        "Still offline, queue drain stopped"
                    );
                    summary.queued_offline = self.queue.len(self.user_id).await?;
                    return Ok(summary);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(synced = summary.synced, "Offline queue drained");
        Ok(summary)
    }

    async fn park_offline(&self, dirty: &[snapledger_core::models::Transaction]) -> Result<usize, AppError> {
        let now = Utc::now();
        for tx in dirty {
            let op = match tx.status {
                TransactionStatus::Deleted => SyncOp::Delete,
                TransactionStatus::Active => SyncOp::Upsert,
            };
            self.queue
                .enqueue(&SyncQueueEntry {
                    transaction_id: tx.transaction_id,
                    user_id: self.user_id,
                    op,
                    enqueued_at: now,
                })
                .await?;
        }
        Ok(dirty.len())
    }
}

/// Spawn a task that drains the offline queue whenever connectivity comes
/// back. Drain failures are logged, not fatal; the queue survives for the
/// next signal.
pub fn spawn_reconnect_drain(
    coordinator: Arc<SyncCoordinator>,
    mut connectivity: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while connectivity.changed().await.is_ok() {
            if !*connectivity.borrow() {
                continue;
            }
            match coordinator.drain_offline_queue().await {
                Ok(summary) if summary.synced > 0 => {
                    tracing::info!(synced = summary.synced, "Reconnect drain pushed queued writes");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Reconnect drain failed");
                }
            }
        }
    })
}

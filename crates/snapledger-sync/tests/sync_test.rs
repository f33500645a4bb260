use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use snapledger_client::{PushResponse, TransactionFetchRequest, TransactionGateway};
use snapledger_core::models::{Transaction, TransactionStatus};
use snapledger_core::AppError;
use snapledger_db::{connect_in_memory, SyncQueueRepository, TransactionRepository};
use snapledger_sync::sync::spawn_reconnect_drain;
use snapledger_sync::{RecoveryService, SyncCoordinator};

/// In-memory remote store with the push endpoint's conditional-write rule:
/// a write is accepted only when the stored copy is absent or older.
struct FakeRemoteStore {
    rows: StdMutex<HashMap<Uuid, Transaction>>,
    online: AtomicBool,
    push_calls: AtomicUsize,
}

impl FakeRemoteStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: StdMutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            push_calls: AtomicUsize::new(0),
        })
    }

    fn seed(&self, tx: Transaction) {
        self.rows.lock().unwrap().insert(tx.transaction_id, tx);
    }

    fn stored(&self, id: Uuid) -> Option<Transaction> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransactionGateway for FakeRemoteStore {
    async fn fetch_transactions(
        &self,
        _request: &TransactionFetchRequest,
    ) -> Result<Vec<Transaction>, AppError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(AppError::Network("connection refused".into()));
        }
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn push_transactions(
        &self,
        _user_id: Uuid,
        transactions: &[Transaction],
    ) -> Result<PushResponse, AppError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(AppError::Network("connection refused".into()));
        }
        self.push_calls.fetch_add(1, Ordering::SeqCst);

        let mut rows = self.rows.lock().unwrap();
        let mut failed_ids = Vec::new();
        for tx in transactions {
            match rows.get(&tx.transaction_id) {
                Some(existing) if existing.updated_at >= tx.updated_at => {
                    failed_ids.push(tx.transaction_id);
                }
                _ => {
                    rows.insert(tx.transaction_id, tx.clone());
                }
            }
        }
        Ok(PushResponse {
            synced_count: transactions.len() - failed_ids.len(),
            failed_ids,
        })
    }
}

struct Harness {
    coordinator: Arc<SyncCoordinator>,
    transactions: TransactionRepository,
    queue: SyncQueueRepository,
    remote: Arc<FakeRemoteStore>,
    user_id: Uuid,
}

async fn harness() -> Harness {
    let pool = connect_in_memory().await.unwrap();
    let transactions = TransactionRepository::new(pool.clone());
    let queue = SyncQueueRepository::new(pool);
    let remote = FakeRemoteStore::new();
    let user_id = Uuid::new_v4();
    let coordinator =
        SyncCoordinator::new(user_id, transactions.clone(), queue.clone(), remote.clone());
    Harness {
        coordinator,
        transactions,
        queue,
        remote,
        user_id,
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn tx(user_id: Uuid, updated_at: DateTime<Utc>) -> Transaction {
    Transaction {
        user_id,
        transaction_id: Uuid::new_v4(),
        payload: json!({"amount": 1200, "merchant": "corner store"}),
        status: TransactionStatus::Active,
        updated_at,
        confirmed_at: None,
        version: 1,
        dirty: false,
    }
}

#[tokio::test]
async fn pull_inserts_and_is_idempotent() {
    let h = harness().await;
    h.remote.seed(tx(h.user_id, at(10)));
    h.remote.seed(tx(h.user_id, at(20)));

    let first = h.coordinator.pull(None, None).await.unwrap();
    assert_eq!(first.fetched, 2);
    assert_eq!(first.inserted, 2);
    assert_eq!(first.conflicts, 0);

    let second = h.coordinator.pull(None, None).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.conflicts, 0);
}

#[tokio::test]
async fn newer_remote_copy_overwrites_local_exactly() {
    let h = harness().await;
    let mut local = tx(h.user_id, at(0));
    local.dirty = true;
    h.transactions.upsert(&local).await.unwrap();

    let mut remote = local.clone();
    remote.payload = json!({"amount": 2500, "merchant": "hardware store"});
    remote.updated_at = at(60);
    remote.version = 2;
    h.remote.seed(remote.clone());

    let summary = h.coordinator.pull(None, None).await.unwrap();
    assert_eq!(summary.conflicts, 1);
    assert_eq!(summary.updated, 1);

    let stored = h
        .transactions
        .get(h.user_id, local.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payload, remote.payload);
    assert_eq!(stored.updated_at, remote.updated_at);
    assert_eq!(stored.version, remote.version);
    assert!(!stored.dirty);
}

#[tokio::test]
async fn confirmed_local_copy_survives_a_newer_remote() {
    let h = harness().await;
    let mut local = tx(h.user_id, at(0));
    local.confirmed_at = Some(at(5));
    local.dirty = true;
    h.transactions.upsert(&local).await.unwrap();

    let mut remote = local.clone();
    remote.confirmed_at = None;
    remote.payload = json!({"amount": 9999});
    remote.updated_at = at(120);
    h.remote.seed(remote);

    let summary = h.coordinator.pull(None, None).await.unwrap();
    assert_eq!(summary.conflicts, 1);
    assert_eq!(summary.updated, 0);

    let stored = h
        .transactions
        .get(h.user_id, local.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payload, local.payload);
    assert_eq!(stored.confirmed_at, local.confirmed_at);
    assert!(stored.dirty);
}

#[tokio::test]
async fn tied_timestamps_resolve_remote_wins() {
    let h = harness().await;
    let local = tx(h.user_id, at(30));
    h.transactions.upsert(&local).await.unwrap();

    let mut remote = local.clone();
    remote.payload = json!({"amount": 4200});
    h.remote.seed(remote.clone());

    let summary = h.coordinator.pull(None, None).await.unwrap();
    assert_eq!(summary.conflicts, 1);
    assert_eq!(summary.updated, 1);

    let stored = h
        .transactions
        .get(h.user_id, local.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payload, remote.payload);
}

#[tokio::test]
async fn push_clears_dirty_and_lands_remotely() {
    let h = harness().await;
    let mut local = tx(h.user_id, at(40));
    local.dirty = true;
    h.transactions.upsert(&local).await.unwrap();

    let summary = h.coordinator.push().await.unwrap();
    assert_eq!(summary.synced, 1);
    assert!(summary.failed_ids.is_empty());

    let stored = h
        .transactions
        .get(h.user_id, local.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.dirty);
    assert!(h.remote.stored(local.transaction_id).is_some());
}

#[tokio::test]
async fn push_rejected_by_conditional_write_stays_dirty() {
    let h = harness().await;
    let mut local = tx(h.user_id, at(0));
    local.dirty = true;
    h.transactions.upsert(&local).await.unwrap();

    let mut remote = local.clone();
    remote.updated_at = at(300);
    h.remote.seed(remote.clone());

    let summary = h.coordinator.push().await.unwrap();
    assert_eq!(summary.synced, 0);
    assert_eq!(summary.failed_ids, vec![local.transaction_id]);

    let stored = h
        .transactions
        .get(h.user_id, local.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.dirty);
    // The remote copy was not double-applied.
    assert_eq!(
        h.remote.stored(local.transaction_id).unwrap().updated_at,
        remote.updated_at
    );
}

#[tokio::test]
async fn offline_push_parks_in_queue_and_drains_on_reconnect() {
    let h = harness().await;
    let mut local = tx(h.user_id, at(50));
    local.dirty = true;
    h.transactions.upsert(&local).await.unwrap();
    h.remote.set_online(false);

    let summary = h.coordinator.push().await.unwrap();
    assert_eq!(summary.synced, 0);
    assert_eq!(summary.queued_offline, 1);
    assert_eq!(h.queue.len(h.user_id).await.unwrap(), 1);

    h.remote.set_online(true);
    let drained = h.coordinator.drain_offline_queue().await.unwrap();
    assert_eq!(drained.synced, 1);
    assert_eq!(h.queue.len(h.user_id).await.unwrap(), 0);

    let stored = h
        .transactions
        .get(h.user_id, local.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.dirty);
    assert!(h.remote.stored(local.transaction_id).is_some());
}

#[tokio::test]
async fn drain_stops_at_the_first_network_failure() {
    let h = harness().await;
    for i in 0..3 {
        let mut local = tx(h.user_id, at(i * 10));
        local.dirty = true;
        h.transactions.upsert(&local).await.unwrap();
    }
    h.remote.set_online(false);
    h.coordinator.push().await.unwrap();
    assert_eq!(h.queue.len(h.user_id).await.unwrap(), 3);

    // Still offline: nothing moves, everything stays parked.
    let drained = h.coordinator.drain_offline_queue().await.unwrap();
    assert_eq!(drained.synced, 0);
    assert_eq!(drained.queued_offline, 3);
    assert_eq!(h.queue.len(h.user_id).await.unwrap(), 3);
}

#[tokio::test]
async fn reconnect_signal_drains_the_queue() {
    let h = harness().await;
    let mut local = tx(h.user_id, at(70));
    local.dirty = true;
    h.transactions.upsert(&local).await.unwrap();
    h.remote.set_online(false);
    h.coordinator.push().await.unwrap();
    assert_eq!(h.queue.len(h.user_id).await.unwrap(), 1);

    let (connectivity_tx, connectivity_rx) = watch::channel(false);
    let handle = spawn_reconnect_drain(h.coordinator.clone(), connectivity_rx);

    h.remote.set_online(true);
    connectivity_tx.send(true).unwrap();

    // Wait for the drain task to empty the queue.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        if h.queue.len(h.user_id).await.unwrap() == 0 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "queue never drained");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let stored = h
        .transactions
        .get(h.user_id, local.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.dirty);
    handle.abort();
}

#[tokio::test]
async fn sync_pulls_before_pushing() {
    let h = harness().await;

    // Remote has a newer copy of A; local has a dirty B.
    let mut a = tx(h.user_id, at(0));
    h.transactions.upsert(&a).await.unwrap();
    a.payload = json!({"amount": 777});
    a.updated_at = at(100);
    h.remote.seed(a.clone());

    let mut b = tx(h.user_id, at(90));
    b.dirty = true;
    h.transactions.upsert(&b).await.unwrap();

    let report = h.coordinator.sync().await.unwrap();
    assert_eq!(report.pull.updated, 1);
    assert_eq!(report.push.synced, 1);

    let stored_a = h
        .transactions
        .get(h.user_id, a.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_a.payload, a.payload);
    assert!(h.remote.stored(b.transaction_id).is_some());
}

#[tokio::test]
async fn recovery_reports_resumes_and_discards() {
    let h = harness().await;
    let recovery = RecoveryService::new(
        h.user_id,
        h.transactions.clone(),
        h.queue.clone(),
        h.coordinator.clone(),
    );

    let clean = recovery.check_recovery_status().await.unwrap();
    assert!(!clean.needs_recovery);

    let mut local = tx(h.user_id, at(80));
    local.dirty = true;
    h.transactions.upsert(&local).await.unwrap();
    h.queue
        .enqueue_upsert(h.user_id, local.transaction_id)
        .await
        .unwrap();

    let status = recovery.check_recovery_status().await.unwrap();
    assert!(status.needs_recovery);
    assert_eq!(status.dirty_count, 1);
    assert_eq!(status.queue_length, 1);

    // Resume runs a full sync and clears the leftovers.
    let report = recovery.resume().await.unwrap();
    assert_eq!(report.push.synced, 1);
    let after = recovery.check_recovery_status().await.unwrap();
    assert!(!after.needs_recovery);
}

#[tokio::test]
async fn discard_accepts_the_remote_state() {
    let h = harness().await;
    let recovery = RecoveryService::new(
        h.user_id,
        h.transactions.clone(),
        h.queue.clone(),
        h.coordinator.clone(),
    );

    let mut local = tx(h.user_id, at(15));
    local.dirty = true;
    h.transactions.upsert(&local).await.unwrap();
    h.queue
        .enqueue_upsert(h.user_id, local.transaction_id)
        .await
        .unwrap();

    let (cleared, dropped) = recovery.discard().await.unwrap();
    assert_eq!(cleared, 1);
    assert_eq!(dropped, 1);
    assert_eq!(h.remote.push_calls.load(Ordering::SeqCst), 0);

    let stored = h
        .transactions
        .get(h.user_id, local.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.dirty);
}

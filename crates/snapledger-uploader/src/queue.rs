//! Upload queue: single-flight worker, classified retry, and pause/resume.
//!
//! The durable queue is the capture store itself (records in `compressed`
//! state); `UploadTask`s are transient. At most one upload attempt is in
//! flight at any time, a queue-wide minimum interval separates attempt
//! starts, and a capture id stays in the in-flight set until its retry
//! backoff has fully elapsed, so a task can never be double-processed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use snapledger_client::{PresignedUploadRequest, UploadGateway};
use snapledger_core::models::{
    CaptureStatus, PauseReason, QueueState, UploadEvent, UploadTask,
};
use snapledger_core::{constants, AppError, ErrorClass};
use snapledger_db::{CaptureRepository, StatusUpdate};
use snapledger_quota::QuotaLedger;

#[derive(Clone)]
pub struct UploadQueueConfig {
    pub max_attempts: u32,
    /// Minimum interval between attempt starts, across the whole queue.
    pub min_start_interval: Duration,
    /// Base of the exponential per-task retry backoff.
    pub backoff_base: Duration,
    pub content_type: String,
}

impl Default for UploadQueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::MAX_UPLOAD_ATTEMPTS,
            min_start_interval: Duration::from_millis(constants::UPLOAD_MIN_START_INTERVAL_MS),
            backoff_base: Duration::from_secs(constants::UPLOAD_BACKOFF_BASE_SECS),
            content_type: "image/webp".to_string(),
        }
    }
}

struct Inner {
    user_id: Uuid,
    capture_repo: CaptureRepository,
    ledger: Arc<QuotaLedger>,
    gateway: Arc<dyn UploadGateway>,
    config: UploadQueueConfig,
    state_tx: watch::Sender<QueueState>,
    event_tx: mpsc::Sender<UploadEvent>,
    in_flight: StdMutex<HashSet<Uuid>>,
    last_start: Mutex<Option<Instant>>,
}

impl Inner {
    fn set_state(&self, state: QueueState) {
        self.state_tx.send_replace(state);
    }

    /// Set Idle only when still Processing, so a pause set during handling
    /// is not stomped.
    fn settle_idle(&self) {
        self.state_tx.send_if_modified(|state| {
            if *state == QueueState::Processing {
                *state = QueueState::Idle;
                true
            } else {
                false
            }
        });
    }

    fn release(&self, capture_id: Uuid) {
        self.in_flight.lock().expect("in-flight lock").remove(&capture_id);
    }
}

pub struct UploadCoordinator {
    inner: Arc<Inner>,
    task_tx: mpsc::Sender<UploadTask>,
    shutdown_tx: mpsc::Sender<()>,
}

impl UploadCoordinator {
    /// Spawns the single-flight worker and the reconnect watcher. Returns
    /// the coordinator and the completion event stream.
    pub fn new(
        user_id: Uuid,
        capture_repo: CaptureRepository,
        ledger: Arc<QuotaLedger>,
        gateway: Arc<dyn UploadGateway>,
        config: UploadQueueConfig,
        connectivity: watch::Receiver<bool>,
    ) -> (Self, mpsc::Receiver<UploadEvent>) {
        let (state_tx, _) = watch::channel(QueueState::Idle);
        let (event_tx, event_rx) = mpsc::channel(64);
        let (task_tx, task_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let inner = Arc::new(Inner {
            user_id,
            capture_repo,
            ledger,
            gateway,
            config,
            state_tx,
            event_tx,
            in_flight: StdMutex::new(HashSet::new()),
            last_start: Mutex::new(None),
        });

        tokio::spawn(Self::worker(inner.clone(), task_rx, shutdown_rx));
        tokio::spawn(Self::reconnect_watcher(inner.clone(), connectivity));

        (
            Self {
                inner,
                task_tx,
                shutdown_tx,
            },
            event_rx,
        )
    }

    /// Enqueue a compressed capture for upload. A capture id already in the
    /// in-flight set is ignored; re-entrant calls cannot double-process.
    #[tracing::instrument(skip(self, local_path))]
    pub async fn enqueue(
        &self,
        capture_id: Uuid,
        local_path: String,
        correlation_id: Uuid,
    ) -> Result<(), AppError> {
        {
            let mut in_flight = self.inner.in_flight.lock().expect("in-flight lock");
            if !in_flight.insert(capture_id) {
                tracing::debug!(capture_id = %capture_id, "Already in flight, ignoring enqueue");
                return Ok(());
            }
        }

        let record = match self.inner.capture_repo.get(capture_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.inner.release(capture_id);
                return Err(AppError::NotFound(format!("Capture record {}", capture_id)));
            }
            Err(e) => {
                self.inner.release(capture_id);
                return Err(e);
            }
        };

        let task = UploadTask::new(capture_id, record.action_id, correlation_id, local_path);
        if self.task_tx.send(task).await.is_err() {
            self.inner.release(capture_id);
            return Err(AppError::Internal("Upload queue is shut down".to_string()));
        }
        Ok(())
    }

    /// Enqueue every capture sitting in `compressed` state, using each
    /// record's trace id as the correlation id. Used at startup and after a
    /// quota pause clears.
    pub async fn enqueue_pending(&self) -> Result<usize, AppError> {
        let pending = self
            .inner
            .capture_repo
            .list_by_status(self.inner.user_id, CaptureStatus::Compressed)
            .await?;
        let mut enqueued = 0;
        for record in pending {
            if self
                .enqueue(record.id, record.local_path.clone(), record.trace_id)
                .await
                .is_ok()
            {
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    pub fn state(&self) -> QueueState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<QueueState> {
        self.inner.state_tx.subscribe()
    }

    /// Pause the queue. The attempt already in flight, if any, runs to
    /// completion; only the next task is prevented from starting.
    pub fn pause(&self, reason: PauseReason) {
        tracing::info!(reason = ?reason, "Upload queue paused");
        self.inner.set_state(QueueState::Paused(reason));
    }

    /// External resumption for `quota` and `unknown` pauses (new permit,
    /// day rollover, or user action).
    pub fn resume(&self) {
        if self.state().is_paused() {
            tracing::info!("Upload queue resumed");
            self.inner.set_state(QueueState::Idle);
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    async fn worker(
        inner: Arc<Inner>,
        mut task_rx: mpsc::Receiver<UploadTask>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Upload queue worker started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Upload queue worker shutting down");
                    break;
                }
                task = task_rx.recv() => {
                    match task {
                        Some(task) => Self::process_task(&inner, task).await,
                        None => break,
                    }
                }
            }
        }
    }

    /// Auto-resume a `network` pause when connectivity returns. `quota` and
    /// `unknown` pauses are left for external resumption.
    async fn reconnect_watcher(inner: Arc<Inner>, mut connectivity: watch::Receiver<bool>) {
        while connectivity.changed().await.is_ok() {
            let online = *connectivity.borrow();
            if online
                && *inner.state_tx.borrow() == QueueState::Paused(PauseReason::Network)
            {
                tracing::info!("Connectivity restored, upload queue resumed");
                inner.set_state(QueueState::Idle);
            }
        }
    }

    async fn wait_until_active(inner: &Arc<Inner>) {
        let mut state_rx = inner.state_tx.subscribe();
        loop {
            let paused = state_rx.borrow_and_update().is_paused();
            if !paused {
                return;
            }
            if state_rx.changed().await.is_err() {
                return;
            }
        }
    }

    #[tracing::instrument(skip(inner, task), fields(capture_id = %task.capture_id, trace_id = %task.correlation_id))]
    async fn process_task(inner: &Arc<Inner>, task: UploadTask) {
        Self::wait_until_active(inner).await;

        // Quota gate: no network call is made when the ledger says no.
        match inner.ledger.can_upload().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("Quota exhausted, pausing queue");
                inner.set_state(QueueState::Paused(PauseReason::Quota));
                inner.release(task.capture_id);
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Quota check failed, pausing queue");
                inner.set_state(QueueState::Paused(PauseReason::Unknown));
                inner.release(task.capture_id);
                return;
            }
        }

        inner.set_state(QueueState::Processing);

        if let Err(e) = inner
            .capture_repo
            .update_status(task.capture_id, CaptureStatus::Uploading, StatusUpdate::default())
            .await
        {
            tracing::error!(error = %e, "Could not mark capture uploading");
            inner.release(task.capture_id);
            inner.settle_idle();
            return;
        }

        let mut task = task;
        match Self::attempt_with_retry(inner, &mut task).await {
            Ok((object_key, correlation_id)) => {
                Self::finish_success(inner, &task, object_key, correlation_id).await;
            }
            Err(e) => {
                Self::finish_failure(inner, &task, e).await;
            }
        }

        inner.release(task.capture_id);
        inner.settle_idle();
    }

    /// Run attempts until success, a non-retryable failure, or the attempt
    /// ceiling. The capture id is held in the in-flight set for the whole
    /// loop, including backoff sleeps.
    async fn attempt_with_retry(
        inner: &Arc<Inner>,
        task: &mut UploadTask,
    ) -> Result<(String, Uuid), AppError> {
        loop {
            Self::rate_limit_gate(inner).await;
            task.attempts += 1;

            match Self::attempt(inner, task).await {
                Ok(done) => return Ok(done),
                Err(e) => {
                    let class = e.class();
                    task.last_error = Some(class);

                    if class.is_retryable() && task.attempts < inner.config.max_attempts {
                        let backoff =
                            inner.config.backoff_base * 2u32.pow(task.attempts - 1);
                        tracing::info!(
                            attempt = task.attempts,
                            backoff_ms = backoff.as_millis() as u64,
                            class = %class,
                            "Upload attempt failed, retrying"
                        );
                        sleep(backoff).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One attempt: presigned URL request (with the permit attached when a
    /// verifiable one is held), then the object PUT.
    async fn attempt(
        inner: &Arc<Inner>,
        task: &UploadTask,
    ) -> Result<(String, Uuid), AppError> {
        let request = PresignedUploadRequest {
            user_id: inner.user_id,
            // Keyed by action id so an idempotent retry lands on the same object.
            object_key_hint: task.action_id.to_string(),
            content_type: inner.config.content_type.clone(),
            permit: inner.ledger.current_permit().await,
        };

        let presigned = inner.gateway.request_presigned_upload(&request).await?;
        inner
            .gateway
            .upload_object(&presigned.upload_url, &task.local_path)
            .await?;

        Ok((presigned.object_key, presigned.correlation_id))
    }

    /// Queue-wide throttle: at most one attempt start per interval,
    /// independent of per-task backoff.
    async fn rate_limit_gate(inner: &Arc<Inner>) {
        let mut last_start = inner.last_start.lock().await;
        if let Some(previous) = *last_start {
            let elapsed = previous.elapsed();
            if elapsed < inner.config.min_start_interval {
                sleep(inner.config.min_start_interval - elapsed).await;
            }
        }
        *last_start = Some(Instant::now());
    }

    async fn finish_success(
        inner: &Arc<Inner>,
        task: &UploadTask,
        object_key: String,
        correlation_id: Uuid,
    ) {
        let update = StatusUpdate {
            object_key: Some(object_key.clone()),
            ..Default::default()
        };
        if let Err(e) = inner
            .capture_repo
            .update_status(task.capture_id, CaptureStatus::Uploaded, update)
            .await
        {
            tracing::error!(error = %e, "Could not mark capture uploaded");
            return;
        }
        // Counters move only after the upload is durably recorded.
        if let Err(e) = inner.ledger.record_upload().await {
            tracing::error!(error = %e, "Could not record upload against quota");
        }
        tracing::info!(capture_id = %task.capture_id, object_key = %object_key, "Upload completed");

        let _ = inner
            .event_tx
            .send(UploadEvent::Completed {
                capture_id: task.capture_id,
                object_key,
                correlation_id,
            })
            .await;
    }

    /// Classified terminal handling. Transient classes rewind the capture
    /// to `compressed` for a later run and pause the queue; `validation`
    /// and `unclassified` mark the record failed and pause for the
    /// operator. The failure is reported once, not per retry.
    async fn finish_failure(inner: &Arc<Inner>, task: &UploadTask, error: AppError) {
        let class = error.class();
        tracing::error!(
            capture_id = %task.capture_id,
            attempts = task.attempts,
            class = %class,
            error = %error,
            "Upload failed"
        );

        match class {
            ErrorClass::Network | ErrorClass::Server | ErrorClass::Quota => {
                let _ = inner
                    .capture_repo
                    .update_status(
                        task.capture_id,
                        CaptureStatus::Compressed,
                        StatusUpdate::default(),
                    )
                    .await;
                let reason = match class {
                    ErrorClass::Network => PauseReason::Network,
                    ErrorClass::Quota => PauseReason::Quota,
                    _ => PauseReason::Unknown,
                };
                inner.set_state(QueueState::Paused(reason));
            }
            ErrorClass::Validation | ErrorClass::Unclassified => {
                let _ = inner
                    .capture_repo
                    .update_status(
                        task.capture_id,
                        CaptureStatus::Failed,
                        StatusUpdate {
                            error_message: Some(error.to_string()),
                            ..Default::default()
                        },
                    )
                    .await;
                inner.set_state(QueueState::Paused(PauseReason::Unknown));
            }
        }

        let _ = inner
            .event_tx
            .send(UploadEvent::Failed {
                capture_id: task.capture_id,
                class,
            })
            .await;
    }
}

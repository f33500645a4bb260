//! Capture Store service.
//!
//! Durable record of every captured image. Dedup runs on content hash
//! before anything else, so duplicates never reach the quota or the upload
//! queue. All status mutation goes through the repository's single
//! `update_status` choke point.

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use snapledger_core::models::{CaptureRecord, CaptureStatus};
use snapledger_core::AppError;
use snapledger_db::{CaptureRepository, StatusUpdate};

/// Result of the external compression step, handed back to the store.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub output_path: String,
    pub compressed_size: i64,
    pub width: i32,
    pub height: i32,
}

/// Service wrapping the capture repository with hashing and file handling.
#[derive(Clone)]
pub struct CaptureStore {
    repo: CaptureRepository,
}

impl CaptureStore {
    pub fn new(repo: CaptureRepository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &CaptureRepository {
        &self.repo
    }

    /// Record a freshly captured file.
    ///
    /// Computes the content hash first; if a non-skipped record with that
    /// hash already exists for the user, the new file is deleted and a
    /// duplicate error is returned instead of a new record.
    #[tracing::instrument(skip(self, path), fields(user_id = %user_id))]
    pub async fn record(&self, user_id: Uuid, path: &str) -> Result<CaptureRecord, AppError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", path, e)))?;
        let content_hash = hex::encode(Sha256::digest(&bytes));

        if let Some(existing) = self.repo.find_by_content_hash(user_id, &content_hash).await? {
            tracing::info!(
                capture_id = %existing.id,
                content_hash = %content_hash,
                "Duplicate capture, discarding file"
            );
            remove_file_if_present(path).await;
            return Err(AppError::DuplicateCapture { content_hash });
        }

        let now = Utc::now();
        let record = CaptureRecord {
            id: Uuid::new_v4(),
            user_id,
            trace_id: Uuid::new_v4(),
            action_id: Uuid::new_v4(),
            status: CaptureStatus::Pending,
            local_path: path.to_string(),
            object_key: None,
            content_hash,
            original_size: bytes.len() as i64,
            compressed_size: None,
            width: None,
            height: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert(&record).await?;

        tracing::info!(capture_id = %record.id, trace_id = %record.trace_id, "Capture recorded");
        Ok(record)
    }

    /// Apply the outcome of the external compression step.
    pub async fn mark_compressed(
        &self,
        id: Uuid,
        outcome: CompressionOutcome,
    ) -> Result<CaptureRecord, AppError> {
        self.repo
            .update_status(
                id,
                CaptureStatus::Compressed,
                StatusUpdate {
                    local_path: Some(outcome.output_path),
                    compressed_size: Some(outcome.compressed_size),
                    width: Some(outcome.width),
                    height: Some(outcome.height),
                    ..Default::default()
                },
            )
            .await
    }

    /// Mark a record as a duplicate of an already-stored capture and free
    /// its local file. Skipped records are invisible to dedup, so the hash
    /// can be recorded again later.
    pub async fn mark_skipped(&self, id: Uuid) -> Result<CaptureRecord, AppError> {
        let record = self
            .repo
            .update_status(id, CaptureStatus::Skipped, StatusUpdate::default())
            .await?;
        remove_file_if_present(&record.local_path).await;
        Ok(record)
    }

    /// Compression failed; the record is terminal.
    pub async fn mark_failed(&self, id: Uuid, message: String) -> Result<CaptureRecord, AppError> {
        self.repo
            .update_status(
                id,
                CaptureStatus::Failed,
                StatusUpdate {
                    error_message: Some(message),
                    ..Default::default()
                },
            )
            .await
    }

    /// Startup repair: an interrupted upload is not resumable mid-transfer,
    /// so any record left in `uploading` is rewound to `compressed`.
    pub async fn repair_interrupted(&self) -> Result<u64, AppError> {
        let repaired = self.repo.reset_interrupted().await?;
        if repaired > 0 {
            tracing::warn!(repaired, "Rewound interrupted uploads to compressed");
        }
        Ok(repaired)
    }

    /// Explicit user removal: deletes the row and the local file. A missing
    /// file is not an error.
    pub async fn remove(&self, id: Uuid) -> Result<bool, AppError> {
        let Some(record) = self.repo.get(id).await? else {
            return Ok(false);
        };
        let deleted = self.repo.delete(id).await?;
        remove_file_if_present(&record.local_path).await;
        Ok(deleted)
    }
}

async fn remove_file_if_present(path: &str) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path, error = %e, "Failed to remove local file");
        }
    }
}

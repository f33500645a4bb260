//! Gateway traits and wire types for the remote collaborators.
//!
//! The coordinators depend on these traits, not on reqwest, so tests drive
//! them with in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ApiClient;
use snapledger_core::models::{Transaction, UploadPermit};
use snapledger_core::AppError;

/// Request for a presigned upload URL. When `permit` is present the endpoint
/// re-verifies its signature server-side; when absent the legacy server-side
/// quota check is engaged.
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUploadRequest {
    pub user_id: Uuid,
    pub object_key_hint: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permit: Option<UploadPermit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresignedUploadResponse {
    pub upload_url: String,
    pub object_key: String,
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionFetchRequest {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushResponse {
    pub synced_count: usize,
    pub failed_ids: Vec<Uuid>,
}

/// Presigned upload endpoint plus the object PUT itself.
#[async_trait]
pub trait UploadGateway: Send + Sync {
    async fn request_presigned_upload(
        &self,
        request: &PresignedUploadRequest,
    ) -> Result<PresignedUploadResponse, AppError>;

    async fn upload_object(&self, upload_url: &str, local_path: &str) -> Result<(), AppError>;
}

/// Permit issuance endpoint.
#[async_trait]
pub trait PermitIssuer: Send + Sync {
    async fn issue_permit(&self, user_id: Uuid, tier: &str) -> Result<UploadPermit, AppError>;
}

/// Transaction fetch and conditional-write push endpoints.
#[async_trait]
pub trait TransactionGateway: Send + Sync {
    async fn fetch_transactions(
        &self,
        request: &TransactionFetchRequest,
    ) -> Result<Vec<Transaction>, AppError>;

    /// Push with "absent or remote `updated_at` older" conditional-write
    /// semantics; retrying an already-applied write is a no-op server-side.
    async fn push_transactions(
        &self,
        user_id: Uuid,
        transactions: &[Transaction],
    ) -> Result<PushResponse, AppError>;
}

#[async_trait]
impl UploadGateway for ApiClient {
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    async fn request_presigned_upload(
        &self,
        request: &PresignedUploadRequest,
    ) -> Result<PresignedUploadResponse, AppError> {
        self.post_json("/api/v0/uploads/presign", request).await
    }

    async fn upload_object(&self, upload_url: &str, local_path: &str) -> Result<(), AppError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", local_path, e)))?;
        self.put_bytes(upload_url, bytes).await
    }
}

#[async_trait]
impl PermitIssuer for ApiClient {
    #[tracing::instrument(skip(self))]
    async fn issue_permit(&self, user_id: Uuid, tier: &str) -> Result<UploadPermit, AppError> {
        #[derive(Serialize)]
        struct IssueRequest<'a> {
            user_id: Uuid,
            tier: &'a str,
        }

        self.post_json("/api/v0/permits/issue", &IssueRequest { user_id, tier })
            .await
    }
}

#[async_trait]
impl TransactionGateway for ApiClient {
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    async fn fetch_transactions(
        &self,
        request: &TransactionFetchRequest,
    ) -> Result<Vec<Transaction>, AppError> {
        self.post_json("/api/v0/transactions/fetch", request).await
    }

    #[tracing::instrument(skip(self, transactions), fields(count = transactions.len()))]
    async fn push_transactions(
        &self,
        user_id: Uuid,
        transactions: &[Transaction],
    ) -> Result<PushResponse, AppError> {
        #[derive(Serialize)]
        struct PushRequest<'a> {
            user_id: Uuid,
            transactions: &'a [Transaction],
        }

        self.post_json(
            "/api/v0/transactions/sync",
            &PushRequest {
                user_id,
                transactions,
            },
        )
        .await
    }
}

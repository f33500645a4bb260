//! HTTP client for the Snapledger remote endpoints.
//!
//! Provides the gateway traits the coordinators consume (so tests can swap
//! in fakes) and a reqwest-backed `ApiClient` implementing them against the
//! presigned-upload, permit-issuance, and transaction-sync endpoints.
//! Transport failures surface as `network`-classified errors; non-2xx
//! statuses are classified by `AppError::from_http_status`.

pub mod gateway;

pub use gateway::{PermitIssuer, TransactionGateway, UploadGateway};
pub use gateway::{
    PresignedUploadRequest, PresignedUploadResponse, PushResponse, TransactionFetchRequest,
};

use anyhow::Context;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use snapledger_core::AppError;

/// Authentication strategy for the remote API.
#[derive(Clone, Debug)]
pub enum Auth {
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// `X-API-Key: {key}`
    XApiKey(String),
    /// Unauthenticated (local development servers).
    None,
}

/// HTTP client for the Snapledger API with configurable auth.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: Auth,
}

impl ApiClient {
    pub fn new(base_url: String, auth: Auth) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn from_config(config: &snapledger_core::Config) -> anyhow::Result<Self> {
        let auth = match &config.api_key {
            Some(key) => Auth::XApiKey(key.clone()),
            None => Auth::None,
        };
        Self::new(config.api_base_url.clone(), auth)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.header("Authorization", format!("Bearer {}", token)),
            Auth::XApiKey(key) => request.header("X-API-Key", key.as_str()),
            Auth::None => request,
        }
    }

    /// POST a JSON body and deserialize the JSON response, classifying
    /// failures into the pipeline taxonomy.
    pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let url = self.build_url(path);
        let request = self.apply_auth(self.client.post(&url)).json(body);

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Network(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::from_http_status(status.as_u16(), message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Malformed response from {}: {}", url, e)))
    }

    /// PUT raw bytes to an absolute (presigned) URL.
    pub(crate) async fn put_bytes(&self, url: &str, bytes: Vec<u8>) -> Result<(), AppError> {
        let response = self
            .client
            .put(url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::from_http_status(status.as_u16(), message));
        }

        Ok(())
    }
}

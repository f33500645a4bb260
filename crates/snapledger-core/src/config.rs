//! Configuration module
//!
//! Env-driven configuration for the local client core. Call
//! `Config::from_env()` once at startup; a `.env` file is honored when
//! present.

use std::env;

use crate::constants::{
    MAX_UPLOAD_ATTEMPTS, PULL_UNPAGINATED_WARN_THRESHOLD, UPLOAD_MIN_START_INTERVAL_MS,
};

#[derive(Clone, Debug)]
pub struct Config {
    /// Path of the local SQLite database file.
    pub database_path: String,
    /// Base URL of the remote API (presigned upload, permits, sync).
    pub api_base_url: String,
    /// API key sent on remote calls.
    pub api_key: Option<String>,
    /// Shared secret for local permit signature verification.
    pub permit_secret: String,
    pub max_upload_attempts: u32,
    pub upload_min_start_interval_ms: u64,
    pub pull_warn_threshold: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_path: env::var("SNAPLEDGER_DB_PATH")
                .unwrap_or_else(|_| "snapledger.db".to_string()),
            api_base_url: env::var("SNAPLEDGER_API_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            api_key: env::var("SNAPLEDGER_API_KEY").ok(),
            permit_secret: env::var("SNAPLEDGER_PERMIT_SECRET")
                .map_err(|_| anyhow::anyhow!("SNAPLEDGER_PERMIT_SECRET must be set"))?,
            max_upload_attempts: parse_or("SNAPLEDGER_MAX_UPLOAD_ATTEMPTS", MAX_UPLOAD_ATTEMPTS),
            upload_min_start_interval_ms: parse_or(
                "SNAPLEDGER_UPLOAD_INTERVAL_MS",
                UPLOAD_MIN_START_INTERVAL_MS,
            ),
            pull_warn_threshold: parse_or(
                "SNAPLEDGER_PULL_WARN_THRESHOLD",
                PULL_UNPAGINATED_WARN_THRESHOLD,
            ),
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

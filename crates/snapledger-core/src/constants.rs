//! Shared numeric defaults for the upload and sync pipeline.

/// Maximum attempts for a single upload task before the queue gives up.
pub const MAX_UPLOAD_ATTEMPTS: u32 = 3;

/// Base of the exponential retry backoff in seconds (1s, 2s, 4s).
pub const UPLOAD_BACKOFF_BASE_SECS: u64 = 1;

/// Minimum interval between upload attempt starts, across the whole queue.
pub const UPLOAD_MIN_START_INTERVAL_MS: u64 = 2_000;

/// Validity window of an issued upload permit.
pub const PERMIT_VALIDITY_DAYS: i64 = 30;

/// Pull fetches the user's whole transaction set; warn above this row count.
pub const PULL_UNPAGINATED_WARN_THRESHOLD: usize = 1_000;

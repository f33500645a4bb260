//! Upload Coordinator: single-flight queue, retry, rate limit, pause/resume.

pub mod queue;

pub use queue::{UploadCoordinator, UploadQueueConfig};

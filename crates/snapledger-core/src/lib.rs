//! Snapledger Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration, and
//! permit signing that are shared across all Snapledger components.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod permit;
pub mod resolution;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorClass};
pub use permit::PermitSigner;
pub use resolution::{resolve, Resolution};

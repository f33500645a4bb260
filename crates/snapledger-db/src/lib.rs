//! Snapledger persistence layer.
//!
//! One repository per table, all mutation funneled through the repository
//! methods. Migrations are forward-only, keyed by version number, and safe
//! to re-run (the migrator records applied versions).

pub mod db;

pub use db::capture::{CaptureRepository, StatusUpdate};
pub use db::quota::QuotaRepository;
pub use db::sync_queue::SyncQueueRepository;
pub use db::transaction::TransactionRepository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Workspace migrations, embedded at compile time.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Open (creating if missing) the local database and run pending migrations.
pub async fn connect(path: &Path) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    MIGRATOR.run(&pool).await?;
    tracing::info!(path = %path.display(), "Database opened, migrations applied");

    Ok(pool)
}

/// In-memory database for tests. A single connection, since every
/// `:memory:` connection is its own database.
pub async fn connect_in_memory() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

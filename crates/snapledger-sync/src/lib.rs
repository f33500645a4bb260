//! Bidirectional transaction sync against the remote store, plus the
//! startup recovery check.

pub mod recovery;
pub mod sync;

pub use recovery::RecoveryService;
pub use sync::{spawn_reconnect_drain, SyncCoordinator, SyncReport};

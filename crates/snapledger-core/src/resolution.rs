//! Conflict resolution for transaction sync.
//!
//! One total, ordered function over (local, remote) pairs. The priority
//! order is: user confirmation beats timestamps, then last-write-wins on
//! `updated_at`, with a tied timestamp resolving remote-wins so that
//! replaying an identical pull is idempotent. The tie-break is load-bearing
//! sync semantics and must not be re-derived.

use crate::models::Transaction;

/// Winner of a (local, remote) pair. Never a partial merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    LocalWins,
    RemoteWins,
}

/// Resolve a local/remote pair, in strict priority order:
///
/// 1. local confirmed, remote not -> local wins unconditionally
/// 2. remote `updated_at` newer   -> remote wins
/// 3. local `updated_at` newer    -> local wins
/// 4. equal timestamps            -> remote wins
pub fn resolve(local: &Transaction, remote: &Transaction) -> Resolution {
    if local.confirmed_at.is_some() && remote.confirmed_at.is_none() {
        return Resolution::LocalWins;
    }
    if remote.updated_at > local.updated_at {
        return Resolution::RemoteWins;
    }
    if local.updated_at > remote.updated_at {
        return Resolution::LocalWins;
    }
    Resolution::RemoteWins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionStatus;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn tx(updated_at: DateTime<Utc>, confirmed_at: Option<DateTime<Utc>>) -> Transaction {
        Transaction {
            user_id: Uuid::nil(),
            transaction_id: Uuid::nil(),
            payload: json!({"amount": 1200}),
            status: TransactionStatus::Active,
            updated_at,
            confirmed_at,
            version: 1,
            dirty: false,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_confirmation_beats_newer_remote_timestamp() {
        let local = tx(at(0), Some(at(0)));
        let remote = tx(at(100), None);
        assert_eq!(resolve(&local, &remote), Resolution::LocalWins);
    }

    #[test]
    fn test_newer_remote_wins_when_neither_confirmed() {
        let local = tx(at(0), None);
        let remote = tx(at(1), None);
        assert_eq!(resolve(&local, &remote), Resolution::RemoteWins);
    }

    #[test]
    fn test_newer_local_wins_when_neither_confirmed() {
        let local = tx(at(5), None);
        let remote = tx(at(1), None);
        assert_eq!(resolve(&local, &remote), Resolution::LocalWins);
    }

    #[test]
    fn test_tied_timestamps_resolve_remote_wins() {
        let local = tx(at(3), None);
        let remote = tx(at(3), None);
        assert_eq!(resolve(&local, &remote), Resolution::RemoteWins);
    }

    #[test]
    fn test_both_confirmed_falls_through_to_timestamps() {
        let local = tx(at(0), Some(at(0)));
        let remote = tx(at(10), Some(at(10)));
        assert_eq!(resolve(&local, &remote), Resolution::RemoteWins);
    }

    #[test]
    fn test_remote_confirmed_local_not_uses_timestamps() {
        // Only the local-confirmed/remote-unconfirmed case short-circuits.
        let local = tx(at(10), None);
        let remote = tx(at(0), Some(at(0)));
        assert_eq!(resolve(&local, &remote), Resolution::LocalWins);
    }
}

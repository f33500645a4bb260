use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signed, time-bounded grant of upload quota issued by the remote authority.
///
/// Never mutated in place; an invalid or expired permit is replaced wholesale
/// by a refresh. `daily_rate == 0` means no daily ceiling at all, only the
/// monthly one (premium tiers get burst capacity).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadPermit {
    pub user_id: Uuid,
    pub total_limit: i64,
    pub daily_rate: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub tier: String,
    /// Hex HMAC-SHA256 over the canonical concatenation of the other fields.
    pub signature: String,
}

impl UploadPermit {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for UploadPermit {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(UploadPermit {
            user_id: row.try_get("user_id")?,
            total_limit: row.try_get("total_limit")?,
            daily_rate: row.try_get("daily_rate")?,
            issued_at: row.try_get("issued_at")?,
            expires_at: row.try_get("expires_at")?,
            tier: row.try_get("tier")?,
            signature: row.try_get("signature")?,
        })
    }
}

/// Local usage counters derived from successful uploads.
///
/// `total_used` is monotonic for the life of a permit; `used_today` resets on
/// local calendar day rollover. Both are incremented together, never one
/// without the other.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageCounters {
    pub total_used: i64,
    pub used_today: i64,
    pub last_upload_date: Option<NaiveDate>,
}

impl UsageCounters {
    /// `used_today` as of `today`: stale counts from a previous day read as 0.
    pub fn used_today_on(&self, today: NaiveDate) -> i64 {
        match self.last_upload_date {
            Some(date) if date == today => self.used_today,
            _ => 0,
        }
    }

    /// Record one successful upload on `today`, rolling the daily counter
    /// over first if the date changed.
    pub fn record(&mut self, today: NaiveDate) {
        self.used_today = self.used_today_on(today) + 1;
        self.total_used += 1;
        self.last_upload_date = Some(today);
    }

    /// Evaluate upload eligibility against `permit` without any network call.
    pub fn can_upload(&self, permit: &UploadPermit, today: NaiveDate) -> bool {
        self.total_used < permit.total_limit
            && (permit.daily_rate == 0 || self.used_today_on(today) < permit.daily_rate)
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for UsageCounters {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(UsageCounters {
            total_used: row.try_get("total_used")?,
            used_today: row.try_get("used_today")?,
            last_upload_date: row.try_get("last_upload_date")?,
        })
    }
}

/// Read-only quota snapshot exposed to the presentation layer.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct QuotaStatus {
    pub remaining_total: i64,
    /// `None` when the tier has no daily ceiling.
    pub remaining_daily: Option<i64>,
    pub tier: Option<String>,
    /// True when no verifiable permit is held and the legacy server-side
    /// check is in effect.
    pub legacy_mode: bool,
}

//! Quota Ledger.
//!
//! Holds the signed upload permit and local usage counters, and answers
//! `can_upload` without a network call. Verification fails closed: an
//! unverifiable or expired permit is treated as absent, which engages the
//! legacy server-side quota check rather than blocking uploads outright.
//! A failed refresh degrades to "permit absent", never to "always allowed"
//! with a stale permit attached.

use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use snapledger_client::PermitIssuer;
use snapledger_core::models::{QuotaStatus, UploadPermit};
use snapledger_core::{AppError, PermitSigner};
use snapledger_db::QuotaRepository;

pub struct QuotaLedger {
    user_id: Uuid,
    tier: String,
    repo: QuotaRepository,
    signer: PermitSigner,
    issuer: Arc<dyn PermitIssuer>,
    permit: Mutex<Option<UploadPermit>>,
    status_tx: watch::Sender<QuotaStatus>,
}

impl QuotaLedger {
    /// Load the cached permit, verify it, and attempt one refresh when no
    /// verifiable permit is held. A refresh failure is tolerated here: the
    /// ledger starts in legacy mode and downstream components keep working.
    pub async fn init(
        user_id: Uuid,
        tier: String,
        repo: QuotaRepository,
        signer: PermitSigner,
        issuer: Arc<dyn PermitIssuer>,
    ) -> Result<Arc<Self>, AppError> {
        let (status_tx, _) = watch::channel(QuotaStatus::default());
        let ledger = Arc::new(Self {
            user_id,
            tier,
            repo,
            signer,
            issuer,
            permit: Mutex::new(None),
            status_tx,
        });

        ledger.load_cached().await?;
        if ledger.permit.lock().await.is_none() {
            if let Err(e) = ledger.refresh(false).await {
                tracing::warn!(error = %e, "Permit refresh failed, legacy quota check engaged");
            }
        }
        ledger.publish_status().await?;
        Ok(ledger)
    }

    async fn load_cached(&self) -> Result<(), AppError> {
        let Some(cached) = self.repo.get_permit(self.user_id).await? else {
            return Ok(());
        };
        match self.signer.validate(&cached) {
            Ok(()) => {
                *self.permit.lock().await = Some(cached);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cached permit rejected, treating as absent");
            }
        }
        Ok(())
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    /// Evaluate upload eligibility without any network call.
    ///
    /// With a verifiable permit: counters against the permit limits. Without
    /// one: true, deferring to the legacy server-side check on the upload
    /// endpoint. Exhaustion is a legitimate terminal state, so it never
    /// triggers a refresh from here.
    pub async fn can_upload(&self) -> Result<bool, AppError> {
        let permit = self.permit.lock().await.clone();
        match permit {
            Some(permit) if !permit.is_expired(Utc::now()) => {
                let counters = self.repo.get_counters(self.user_id).await?;
                Ok(counters.can_upload(&permit, self.today()))
            }
            _ => Ok(true),
        }
    }

    /// Record one durably-completed upload. Both counters move in a single
    /// statement; the daily one rolls over if the local date changed.
    pub async fn record_upload(&self) -> Result<(), AppError> {
        self.repo.record_upload(self.user_id, self.today()).await?;
        self.publish_status().await
    }

    pub async fn status(&self) -> Result<QuotaStatus, AppError> {
        let permit = self.permit.lock().await.clone();
        let Some(permit) = permit else {
            return Ok(QuotaStatus {
                legacy_mode: true,
                ..Default::default()
            });
        };

        let counters = self.repo.get_counters(self.user_id).await?;
        Ok(QuotaStatus {
            remaining_total: (permit.total_limit - counters.total_used).max(0),
            remaining_daily: (permit.daily_rate > 0).then(|| {
                (permit.daily_rate - counters.used_today_on(self.today())).max(0)
            }),
            tier: Some(permit.tier.clone()),
            legacy_mode: false,
        })
    }

    /// Subscribe to status snapshots. The presentation layer observes
    /// through this channel and never mutates the ledger.
    pub fn subscribe(&self) -> watch::Receiver<QuotaStatus> {
        self.status_tx.subscribe()
    }

    /// The permit to attach to upload requests, if a verifiable one is held.
    ///
    /// An expired permit is treated as absent: observing one triggers a
    /// refresh attempt, and only a fresh, unexpired permit is handed out.
    /// When the refresh fails the legacy no-permit path is engaged.
    pub async fn current_permit(&self) -> Option<UploadPermit> {
        let permit = self.permit.lock().await.clone();
        match permit {
            Some(permit) if !permit.is_expired(Utc::now()) => Some(permit),
            Some(_) => {
                if let Err(e) = self.refresh(false).await {
                    tracing::warn!(error = %e, "Permit refresh failed, legacy quota check engaged");
                    return None;
                }
                self.permit
                    .lock()
                    .await
                    .clone()
                    .filter(|p| !p.is_expired(Utc::now()))
            }
            None => None,
        }
    }

    /// Fetch a fresh permit when none is held, the held one expired, or
    /// `forced`. Returns whether a refresh actually ran. An issued permit
    /// with a bad signature fails closed and leaves the ledger permit-less.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self, forced: bool) -> Result<bool, AppError> {
        {
            let permit = self.permit.lock().await;
            let held_valid = permit
                .as_ref()
                .map(|p| !p.is_expired(Utc::now()))
                .unwrap_or(false);
            if held_valid && !forced {
                return Ok(false);
            }
        }

        match self.issuer.issue_permit(self.user_id, &self.tier).await {
            Ok(fresh) => {
                self.signer.validate(&fresh)?;
                self.repo.put_permit(&fresh).await?;
                self.repo.reset_counters(self.user_id).await?;
                *self.permit.lock().await = Some(fresh.clone());
                self.publish_status().await?;
                tracing::info!(
                    tier = %fresh.tier,
                    total_limit = fresh.total_limit,
                    daily_rate = fresh.daily_rate,
                    "Permit refreshed"
                );
                Ok(true)
            }
            Err(e) => {
                *self.permit.lock().await = None;
                self.publish_status().await?;
                Err(e)
            }
        }
    }

    async fn publish_status(&self) -> Result<(), AppError> {
        let status = self.status().await?;
        let _ = self.status_tx.send(status);
        Ok(())
    }
}

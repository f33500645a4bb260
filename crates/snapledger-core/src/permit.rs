//! Permit signing and verification.
//!
//! Canonical payload: `user_id|total_limit|daily_rate|issued_at_ts|expires_at_ts|tier`
//! (unix second timestamps). Signature = hex(HMAC-SHA256(secret, payload)).
//! Verification fails closed: any altered field invalidates the signature,
//! and an unverifiable permit is treated as absent.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AppError;
use crate::models::UploadPermit;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies upload permits with a shared secret.
#[derive(Clone)]
pub struct PermitSigner {
    secret: Vec<u8>,
}

impl PermitSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn canonical_payload(permit: &UploadPermit) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            permit.user_id,
            permit.total_limit,
            permit.daily_rate,
            permit.issued_at.timestamp(),
            permit.expires_at.timestamp(),
            permit.tier,
        )
    }

    /// Compute the signature for `permit`, ignoring any signature it carries.
    pub fn sign(&self, permit: &UploadPermit) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(Self::canonical_payload(permit).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify the permit's embedded signature. Constant-time on the MAC
    /// comparison; expiry is checked separately by the ledger.
    pub fn verify(&self, permit: &UploadPermit) -> bool {
        let Ok(tag) = hex::decode(&permit.signature) else {
            return false;
        };
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(Self::canonical_payload(permit).as_bytes());
        mac.verify_slice(&tag).is_ok()
    }

    /// Verify signature and expiry together; the error spells out which
    /// check failed for the refresh path's logging.
    pub fn validate(&self, permit: &UploadPermit) -> Result<(), AppError> {
        if !self.verify(permit) {
            return Err(AppError::InvalidPermit(
                "signature does not verify".to_string(),
            ));
        }
        if permit.is_expired(Utc::now()) {
            return Err(AppError::InvalidPermit(format!(
                "expired at {}",
                permit.expires_at
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn permit() -> UploadPermit {
        let issued_at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        UploadPermit {
            user_id: Uuid::new_v4(),
            total_limit: 500,
            daily_rate: 30,
            issued_at,
            expires_at: issued_at + Duration::days(30),
            tier: "guest".to_string(),
            signature: String::new(),
        }
    }

    #[test]
    fn test_signed_permit_verifies() {
        let signer = PermitSigner::new(b"test-secret".to_vec());
        let mut p = permit();
        p.signature = signer.sign(&p);
        assert!(signer.verify(&p));
    }

    #[test]
    fn test_any_altered_field_invalidates_signature() {
        let signer = PermitSigner::new(b"test-secret".to_vec());
        let mut p = permit();
        p.signature = signer.sign(&p);

        let mut tampered = p.clone();
        tampered.total_limit = 5_000;
        assert!(!signer.verify(&tampered));

        let mut tampered = p.clone();
        tampered.daily_rate = 0;
        assert!(!signer.verify(&tampered));

        let mut tampered = p.clone();
        tampered.tier = "pro".to_string();
        assert!(!signer.verify(&tampered));

        let mut tampered = p.clone();
        tampered.expires_at = p.expires_at + Duration::days(365);
        assert!(!signer.verify(&tampered));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let signer = PermitSigner::new(b"test-secret".to_vec());
        let other = PermitSigner::new(b"other-secret".to_vec());
        let mut p = permit();
        p.signature = signer.sign(&p);
        assert!(!other.verify(&p));
    }

    #[test]
    fn test_garbage_signature_fails_closed() {
        let signer = PermitSigner::new(b"test-secret".to_vec());
        let mut p = permit();
        p.signature = "not-hex".to_string();
        assert!(!signer.verify(&p));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{trustEpoch, activeKeyVersion, revokedKeyVersions, lastRotatedAt, epochAdvancedAt}`.
///
/// Invariants: `activeKeyVersion ∉ revokedKeyVersions`; an active key must
/// exist in the key vault; rotation always increases both
/// `activeKeyVersion` and `trustEpoch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEpochState {
    pub trust_epoch: u64,
    pub active_key_version: u64,
    pub revoked_key_versions: Vec<u64>,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub epoch_advanced_at: Option<DateTime<Utc>>,
}

impl TrustEpochState {
    pub fn genesis() -> Self {
        Self {
            trust_epoch: 1,
            active_key_version: 1,
            revoked_key_versions: Vec::new(),
            last_rotated_at: None,
            epoch_advanced_at: None,
        }
    }

    pub fn is_internally_consistent(&self) -> bool {
        !self.revoked_key_versions.contains(&self.active_key_version)
    }
}

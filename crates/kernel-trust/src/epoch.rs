use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use kernel_crypto::MacKey;
use kernel_model::TrustEpochState;
use kernel_vault::SigningVault;
use parking_lot::Mutex;

use crate::TrustError;

/// Trust Epoch Manager (C3): versioned HMAC keys, an epoch counter, and
/// rotation/revocation, persisted atomically.
pub struct TrustEpochManager<V: SigningVault> {
    state: TrustEpochState,
    path: PathBuf,
    vault: Arc<Mutex<V>>,
}

impl<V: SigningVault> TrustEpochManager<V> {
    pub fn open(dir: &Path, vault: Arc<Mutex<V>>) -> Result<Self, TrustError> {
        let path = dir.join("trust_epoch_state.json");
        let state = kernel_storage::read_json(&path)?.unwrap_or_else(TrustEpochState::genesis);

        if !vault.lock().has_mac_key(state.active_key_version) {
            vault
                .lock()
                .store_mac_key(state.active_key_version, MacKey::generate())
                .map_err(TrustError::Vault)?;
        }

        let manager = Self { state, path, vault };
        manager.persist()?;
        Ok(manager)
    }

    pub fn state(&self) -> &TrustEpochState {
        &self.state
    }

    pub fn active_mac_key(&self) -> Result<MacKey, TrustError> {
        self.vault
            .lock()
            .active_mac_key(self.state.active_key_version)
            .map_err(TrustError::Vault)
    }

    /// Generates a new HMAC key in the vault under `activeKeyVersion + 1`,
    /// revokes the old version, and advances the epoch. Both
    /// `activeKeyVersion` and `trustEpoch` strictly increase (P6).
    pub fn rotate_key(&mut self) -> Result<(), TrustError> {
        let new_version = self.state.active_key_version + 1;
        self.vault
            .lock()
            .store_mac_key(new_version, MacKey::generate())
            .map_err(TrustError::Vault)?;

        self.state.revoked_key_versions.push(self.state.active_key_version);
        self.state.active_key_version = new_version;
        self.state.trust_epoch += 1;
        self.state.last_rotated_at = Some(Utc::now());
        self.persist()?;
        tracing::warn!(
            new_version,
            epoch = self.state.trust_epoch,
            "rotated HMAC signing key"
        );
        Ok(())
    }

    /// Epoch advancement without rotation, permitted on security events
    /// (device revocation, evidence divergence, integrity failure).
    /// Immediately invalidates all outstanding tokens bound to the prior
    /// epoch.
    pub fn advance_epoch(&mut self, reason: &str) -> Result<(), TrustError> {
        self.state.trust_epoch += 1;
        self.state.epoch_advanced_at = Some(Utc::now());
        self.persist()?;
        tracing::warn!(reason, epoch = self.state.trust_epoch, "advanced trust epoch");
        Ok(())
    }

    /// Active key exists in the vault, is not revoked, and the state file
    /// is internally consistent.
    pub fn verify_integrity(&self) -> bool {
        self.state.is_internally_consistent()
            && self.vault.lock().has_mac_key(self.state.active_key_version)
    }

    /// Split out of [`Self::verify_integrity`] for the integrity guard's
    /// per-check posture reporting (C13 checks 1-3).
    pub fn active_key_in_vault(&self) -> bool {
        self.vault.lock().has_mac_key(self.state.active_key_version)
    }

    pub fn active_key_not_revoked(&self) -> bool {
        !self
            .state
            .revoked_key_versions
            .contains(&self.state.active_key_version)
    }

    pub fn epoch_state_consistent(&self) -> bool {
        self.state.is_internally_consistent()
    }

    fn persist(&self) -> Result<(), TrustError> {
        kernel_storage::write_json_atomic(&self.path, &self.state)?;
        Ok(())
    }
}

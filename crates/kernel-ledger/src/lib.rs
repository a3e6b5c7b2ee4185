//! Evidence Ledger (C6) and Evidence Mirror (C7): the append-only,
//! hash-chained audit trail every pipeline phase writes through, and the
//! periodic remote-witness push that detects tampering with the local copy.

pub mod ledger;
pub mod mirror;
pub mod payload;

pub use ledger::EvidenceLedger;
pub use mirror::{EvidenceMirror, MirrorAck, MirrorReport, MirrorTransport};
pub use payload::EvidencePayload;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] kernel_storage::StorageError),
    #[error("failed to encode or decode an evidence entry: {0}")]
    Decode(String),
    #[error(transparent)]
    Crypto(#[from] kernel_crypto::CryptoError),
    #[error(transparent)]
    Trust(#[from] kernel_trust::TrustError),
    #[error(transparent)]
    Vault(kernel_vault::VaultError),
    #[error("mirror transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use kernel_model::EvidenceEntryType;
    use kernel_vault::{AlwaysApprove, FileBackedVault};
    use parking_lot::Mutex;
    use uuid::Uuid;

    use super::*;

    fn build_ledger(dir: &std::path::Path) -> EvidenceLedger<FileBackedVault<AlwaysApprove>> {
        let vault = Arc::new(Mutex::new(
            FileBackedVault::open_or_create(&dir.join("vault"), AlwaysApprove).unwrap(),
        ));
        let trust = Arc::new(Mutex::new(
            kernel_trust::TrustEpochManager::open(&dir.join("trust"), vault).unwrap(),
        ));
        EvidenceLedger::open(dir.join("ledger.jsonl"), Uuid::new_v4(), trust).unwrap()
    }

    #[test]
    fn appended_chain_verifies_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = build_ledger(dir.path());

        for i in 0..5 {
            ledger
                .append(
                    EvidenceEntryType::SystemEvent,
                    EvidencePayload::SystemEvent {
                        message: format!("event {i}"),
                    },
                )
                .unwrap();
        }

        let verification = ledger.verify_chain_integrity().unwrap();
        assert!(verification.overall_valid);
        assert_eq!(verification.entries_checked, 5);
    }

    #[test]
    fn tampered_entry_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = build_ledger(dir.path());
        ledger
            .append(
                EvidenceEntryType::SystemEvent,
                EvidencePayload::SystemEvent {
                    message: "original".into(),
                },
            )
            .unwrap();

        let path = dir.path().join("ledger.jsonl");
        let raw = std::fs::read_to_string(&path).unwrap();
        let tampered = raw.replace("original", "tampered!");
        std::fs::write(&path, tampered).unwrap();

        let verification = ledger.verify_chain_integrity().unwrap();
        assert!(!verification.overall_valid);
        assert!(verification
            .violations
            .iter()
            .any(|v| matches!(v.kind, kernel_model::IntegrityViolationKind::DataCorruption)));
    }

    #[test]
    fn reopening_recovers_last_hash_for_chaining() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = build_ledger(dir.path());
        let first = ledger
            .append(
                EvidenceEntryType::SystemEvent,
                EvidencePayload::SystemEvent { message: "a".into() },
            )
            .unwrap();
        drop(ledger);

        let vault = Arc::new(Mutex::new(
            FileBackedVault::open_or_create(&dir.path().join("vault"), AlwaysApprove).unwrap(),
        ));
        let trust = Arc::new(Mutex::new(
            kernel_trust::TrustEpochManager::open(&dir.path().join("trust"), vault).unwrap(),
        ));
        let mut reopened =
            EvidenceLedger::open(dir.path().join("ledger.jsonl"), first.chain_id, trust).unwrap();
        let second = reopened
            .append(
                EvidenceEntryType::SystemEvent,
                EvidencePayload::SystemEvent { message: "b".into() },
            )
            .unwrap();
        assert_eq!(second.previous_hash, first.current_hash);
    }

    struct EchoTransport;

    #[async_trait]
    impl MirrorTransport for EchoTransport {
        async fn push(&self, report: &MirrorReport) -> Result<MirrorAck, LedgerError> {
            Ok(MirrorAck {
                remote_chain_hash: Some(report.chain_hash.clone()),
            })
        }
    }

    struct DivergentTransport;

    #[async_trait]
    impl MirrorTransport for DivergentTransport {
        async fn push(&self, _report: &MirrorReport) -> Result<MirrorAck, LedgerError> {
            Ok(MirrorAck {
                remote_chain_hash: Some("0".repeat(64)),
            })
        }
    }

    #[tokio::test]
    async fn matching_remote_hash_reports_no_divergence() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(Mutex::new(
            FileBackedVault::open_or_create(&dir.path().join("vault"), AlwaysApprove).unwrap(),
        ));
        let trust = Arc::new(Mutex::new(
            kernel_trust::TrustEpochManager::open(&dir.path().join("trust"), vault.clone()).unwrap(),
        ));
        let mut ledger =
            EvidenceLedger::open(dir.path().join("ledger.jsonl"), Uuid::new_v4(), trust.clone())
                .unwrap();
        ledger
            .append(
                EvidenceEntryType::SystemEvent,
                EvidencePayload::SystemEvent { message: "a".into() },
            )
            .unwrap();

        let mirror = EvidenceMirror::new(vault, trust, EchoTransport);
        assert!(mirror.push_once(&ledger).await.unwrap());
    }

    #[tokio::test]
    async fn divergent_remote_hash_advances_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(Mutex::new(
            FileBackedVault::open_or_create(&dir.path().join("vault"), AlwaysApprove).unwrap(),
        ));
        let trust = Arc::new(Mutex::new(
            kernel_trust::TrustEpochManager::open(&dir.path().join("trust"), vault.clone()).unwrap(),
        ));
        let mut ledger =
            EvidenceLedger::open(dir.path().join("ledger.jsonl"), Uuid::new_v4(), trust.clone())
                .unwrap();
        ledger
            .append(
                EvidenceEntryType::SystemEvent,
                EvidencePayload::SystemEvent { message: "a".into() },
            )
            .unwrap();

        let epoch_before = trust.lock().state().trust_epoch;
        let mirror = EvidenceMirror::new(vault, trust.clone(), DivergentTransport);
        assert!(!mirror.push_once(&ledger).await.unwrap());
        assert!(trust.lock().state().trust_epoch > epoch_before);
    }
}

//! Integrity Guard (C13): runs five checks on every launch and derives a
//! posture (`nominal`/`degraded`/`lockdown`) that gates token issuance,
//! execution, and model calls. There is no silent recovery: clearing
//! `lockdown` requires re-running the full check set and observing no
//! remaining critical failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kernel_ledger::EvidenceLedger;
use kernel_model::{IntegrityCheckResult, IntegrityCheckSeverity, IntegrityPosture, IntegrityReport};
use kernel_trust::{DeviceRegistry, TrustEpochManager};
use kernel_vault::SigningVault;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error(transparent)]
    Storage(#[from] kernel_storage::StorageError),
    #[error(transparent)]
    Ledger(#[from] kernel_ledger::LedgerError),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LaunchMarker {
    first_check_completed: bool,
}

/// Integrity Guard (C13).
pub struct IntegrityGuard<V: SigningVault> {
    trust: Arc<Mutex<TrustEpochManager<V>>>,
    devices: Arc<Mutex<DeviceRegistry>>,
    device_fingerprint: String,
    marker_path: PathBuf,
    locked: Mutex<bool>,
}

impl<V: SigningVault> IntegrityGuard<V> {
    pub fn new(
        dir: &Path,
        trust: Arc<Mutex<TrustEpochManager<V>>>,
        devices: Arc<Mutex<DeviceRegistry>>,
        device_fingerprint: String,
    ) -> Self {
        Self {
            trust,
            devices,
            device_fingerprint,
            marker_path: dir.join("integrity_guard_state.json"),
            locked: Mutex::new(false),
        }
    }

    /// Runs all five launch-time checks and derives a posture. Always
    /// succeeds in the sense of returning a report — a failed check is
    /// data, not an error; `IntegrityError` is reserved for I/O failures
    /// while reading the ledger or the launch marker itself.
    pub fn run_checks(&self, ledger: &EvidenceLedger<V>) -> Result<IntegrityReport, IntegrityError> {
        let mut checks = Vec::with_capacity(5);
        checks.push(self.check_active_key_exists());
        checks.push(self.check_active_key_not_revoked());
        checks.push(self.check_epoch_state_consistent());
        checks.push(self.check_device_registry()?);
        checks.push(self.check_ledger_integrity(ledger)?);

        let report = IntegrityReport::from_checks(checks);
        *self.locked.lock() = report.posture == IntegrityPosture::Lockdown;

        match report.posture {
            IntegrityPosture::Nominal => tracing::info!("integrity guard: nominal"),
            IntegrityPosture::Degraded => tracing::warn!("integrity guard: degraded"),
            IntegrityPosture::Lockdown => tracing::error!("integrity guard: lockdown"),
        }

        self.mark_first_check_completed()?;
        Ok(report)
    }

    fn check_active_key_exists(&self) -> IntegrityCheckResult {
        let ok = self.trust.lock().active_key_in_vault();
        IntegrityCheckResult {
            name: "active_key_exists",
            severity: if ok {
                IntegrityCheckSeverity::Ok
            } else {
                IntegrityCheckSeverity::Critical
            },
            detail: if ok {
                "active HMAC key present in vault".to_string()
            } else {
                "active HMAC key is missing from the vault".to_string()
            },
        }
    }

    fn check_active_key_not_revoked(&self) -> IntegrityCheckResult {
        let ok = self.trust.lock().active_key_not_revoked();
        IntegrityCheckResult {
            name: "active_key_not_revoked",
            severity: if ok {
                IntegrityCheckSeverity::Ok
            } else {
                IntegrityCheckSeverity::Critical
            },
            detail: if ok {
                "active key version is not in the revoked set".to_string()
            } else {
                "active key version has been revoked".to_string()
            },
        }
    }

    fn check_epoch_state_consistent(&self) -> IntegrityCheckResult {
        let ok = self.trust.lock().epoch_state_consistent();
        IntegrityCheckResult {
            name: "trust_epoch_consistent",
            severity: if ok {
                IntegrityCheckSeverity::Ok
            } else {
                IntegrityCheckSeverity::Critical
            },
            detail: if ok {
                "trust epoch state is internally consistent".to_string()
            } else {
                "trust epoch state failed its consistency check".to_string()
            },
        }
    }

    /// Missing fingerprint and first-launch race are warnings (degraded);
    /// a present-but-untrusted fingerprint on a later launch is critical.
    fn check_device_registry(&self) -> Result<IntegrityCheckResult, IntegrityError> {
        if self.device_fingerprint.is_empty() {
            return Ok(IntegrityCheckResult {
                name: "device_registry_integrity",
                severity: IntegrityCheckSeverity::Warning,
                detail: "device fingerprint unavailable".to_string(),
            });
        }

        let is_first_launch = !self.load_marker()?.first_check_completed;
        let trusted = self.devices.lock().is_device_trusted(&self.device_fingerprint);

        let severity = if trusted {
            IntegrityCheckSeverity::Ok
        } else if is_first_launch {
            IntegrityCheckSeverity::Warning
        } else {
            IntegrityCheckSeverity::Critical
        };

        let detail = match severity {
            IntegrityCheckSeverity::Ok => "current device is trusted".to_string(),
            IntegrityCheckSeverity::Warning => {
                "current device not yet registered (first-launch race)".to_string()
            }
            IntegrityCheckSeverity::Critical => {
                "current device fingerprint is not in the trusted registry".to_string()
            }
        };

        Ok(IntegrityCheckResult {
            name: "device_registry_integrity",
            severity,
            detail,
        })
    }

    /// An empty ledger or a decode failure may just mean a fresh install
    /// (warning); a ledger with entries whose hash chain doesn't verify is
    /// critical.
    fn check_ledger_integrity(
        &self,
        ledger: &EvidenceLedger<V>,
    ) -> Result<IntegrityCheckResult, IntegrityError> {
        let verification = ledger.verify_chain_integrity()?;

        if verification.entries_checked == 0 {
            return Ok(IntegrityCheckResult {
                name: "ledger_integrity",
                severity: IntegrityCheckSeverity::Warning,
                detail: "ledger is empty, consistent with a fresh install".to_string(),
            });
        }

        let severity = if verification.overall_valid {
            IntegrityCheckSeverity::Ok
        } else {
            IntegrityCheckSeverity::Critical
        };
        let detail = if verification.overall_valid {
            format!("{} entries verified clean", verification.entries_checked)
        } else {
            format!(
                "{} of {} entries failed verification",
                verification.violations.len(),
                verification.entries_checked
            )
        };

        Ok(IntegrityCheckResult {
            name: "ledger_integrity",
            severity,
            detail,
        })
    }

    /// Forces lockdown regardless of check results, e.g. on an
    /// out-of-band security event.
    pub fn force_lockdown(&self, reason: &str) {
        *self.locked.lock() = true;
        tracing::error!(reason, "integrity guard forced into lockdown");
    }

    /// Re-runs the full check set. Clears lockdown only if no check comes
    /// back critical; there is no partial or degraded-execution recovery.
    pub fn attempt_recovery(
        &self,
        ledger: &EvidenceLedger<V>,
    ) -> Result<IntegrityReport, IntegrityError> {
        tracing::warn!("attempting integrity recovery: re-running full check set");
        self.run_checks(ledger)
    }

    /// Clears the persisted first-launch marker. A dangerous operation —
    /// callers MUST log this to the evidence ledger themselves as a
    /// violation, since resetting integrity state is itself a security
    /// event.
    pub fn reset_integrity_state(&self) -> Result<(), IntegrityError> {
        kernel_storage::write_json_atomic(&self.marker_path, &LaunchMarker::default())?;
        *self.locked.lock() = false;
        tracing::warn!("integrity state reset");
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }

    pub fn is_vault_usable(&self) -> bool {
        !self.is_locked()
    }

    fn load_marker(&self) -> Result<LaunchMarker, IntegrityError> {
        Ok(kernel_storage::read_json(&self.marker_path)?.unwrap_or_default())
    }

    fn mark_first_check_completed(&self) -> Result<(), IntegrityError> {
        kernel_storage::write_json_atomic(
            &self.marker_path,
            &LaunchMarker {
                first_check_completed: true,
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kernel_model::EvidenceEntryType;
    use kernel_vault::{AlwaysApprove, FileBackedVault};
    use parking_lot::Mutex;
    use uuid::Uuid;

    use super::*;

    fn build(
        dir: &std::path::Path,
    ) -> (
        IntegrityGuard<FileBackedVault<AlwaysApprove>>,
        EvidenceLedger<FileBackedVault<AlwaysApprove>>,
    ) {
        let vault = Arc::new(Mutex::new(
            FileBackedVault::open_or_create(&dir.join("vault"), AlwaysApprove).unwrap(),
        ));
        let trust = Arc::new(Mutex::new(
            kernel_trust::TrustEpochManager::open(&dir.join("trust"), vault.clone()).unwrap(),
        ));
        let fingerprint = vault.lock().device_fingerprint();
        let devices = Arc::new(Mutex::new(
            kernel_trust::DeviceRegistry::open(&dir.join("trust"), &fingerprint).unwrap(),
        ));
        let ledger =
            EvidenceLedger::open(dir.join("ledger.jsonl"), Uuid::new_v4(), trust.clone()).unwrap();
        let guard = IntegrityGuard::new(dir, trust, devices, fingerprint);
        (guard, ledger)
    }

    #[test]
    fn fresh_install_with_empty_ledger_is_nominal_or_degraded_never_lockdown() {
        let dir = tempfile::tempdir().unwrap();
        let (guard, ledger) = build(dir.path());

        let report = guard.run_checks(&ledger).unwrap();
        assert_ne!(report.posture, IntegrityPosture::Lockdown);
    }

    #[test]
    fn corrupted_ledger_with_entries_triggers_lockdown() {
        let dir = tempfile::tempdir().unwrap();
        let (guard, mut ledger) = build(dir.path());
        ledger
            .append(
                EvidenceEntryType::SystemEvent,
                kernel_ledger::EvidencePayload::SystemEvent { message: "a".into() },
            )
            .unwrap();

        let path = dir.path().join("ledger.jsonl");
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace('a', "z")).unwrap();

        let report = guard.run_checks(&ledger).unwrap();
        assert_eq!(report.posture, IntegrityPosture::Lockdown);
        assert!(guard.is_locked());
    }

    #[test]
    fn recovery_clears_lockdown_once_underlying_fault_is_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let (guard, ledger) = build(dir.path());
        guard.force_lockdown("simulated security event");
        assert!(guard.is_locked());

        let report = guard.attempt_recovery(&ledger).unwrap();
        assert_ne!(report.posture, IntegrityPosture::Lockdown);
        assert!(!guard.is_locked());
    }
}

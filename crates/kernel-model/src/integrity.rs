use serde::{Deserialize, Serialize};

/// Severity of a single integrity check's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityCheckSeverity {
    Ok,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityCheckResult {
    pub name: &'static str,
    pub severity: IntegrityCheckSeverity,
    pub detail: String,
}

/// `nominal` (all pass), `degraded` (warnings only), `lockdown` (any
/// critical). Lockdown blocks all token issuance, all execution, all model
/// calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityPosture {
    Nominal,
    Degraded,
    Lockdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub posture: IntegrityPosture,
    pub checks: Vec<IntegrityCheckResult>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl IntegrityReport {
    pub fn from_checks(checks: Vec<IntegrityCheckResult>) -> Self {
        let posture = if checks
            .iter()
            .any(|c| c.severity == IntegrityCheckSeverity::Critical)
        {
            IntegrityPosture::Lockdown
        } else if checks
            .iter()
            .any(|c| c.severity == IntegrityCheckSeverity::Warning)
        {
            IntegrityPosture::Degraded
        } else {
            IntegrityPosture::Nominal
        };
        Self {
            posture,
            checks,
            checked_at: chrono::Utc::now(),
        }
    }
}

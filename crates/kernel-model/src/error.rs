use serde::{Deserialize, Serialize};

/// The four error categories from §7. Every cross-component call that can
/// deny execution returns (or converts into) this enum; panics are
/// reserved for broken invariants, not for ordinary denial.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum KernelError {
    #[error("input violation at phase {phase}: {reason}")]
    InputViolation { phase: String, reason: String },

    #[error("verification failure: {reason}")]
    VerificationFailure { reason: String },

    #[error("policy denial: {reason}")]
    PolicyDenial { reason: String },

    #[error("integrity failure: {reason}")]
    IntegrityFailure { reason: String },
}

impl KernelError {
    pub fn input(phase: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InputViolation {
            phase: phase.into(),
            reason: reason.into(),
        }
    }

    pub fn verification(reason: impl Into<String>) -> Self {
        Self::VerificationFailure {
            reason: reason.into(),
        }
    }

    pub fn policy(reason: impl Into<String>) -> Self {
        Self::PolicyDenial {
            reason: reason.into(),
        }
    }

    pub fn integrity(reason: impl Into<String>) -> Self {
        Self::IntegrityFailure {
            reason: reason.into(),
        }
    }
}

//! Shared data model for the capability kernel.
//!
//! Every entity here is a closed enumeration or a plain struct — no
//! behavior beyond the pure helpers a type needs to describe itself
//! (canonical byte framing, hash recomputation). The decision logic that
//! operates on these types lives in the sibling `kernel-*` crates.

pub mod device;
pub mod error;
pub mod evidence;
pub mod integrity;
pub mod intent;
pub mod phase;
pub mod plan;
pub mod policy;
pub mod risk;
pub mod token;
pub mod trust;
pub mod verify;

pub use device::{DeviceTrustState, TrustedDevice};
pub use error::KernelError;
pub use evidence::{
    ChainVerification, EvidenceEntry, EvidenceEntryType, IntegrityViolation,
    IntegrityViolationKind, PolicyViolationKind, GENESIS_HASH,
};
pub use integrity::{IntegrityCheckResult, IntegrityCheckSeverity, IntegrityPosture, IntegrityReport};
pub use intent::{classify_action, classify_sensitivity, ExecutionIntent, IntentType, ReversibilityClass, Sensitivity};
pub use phase::{KernelPhase, PendingPlanContext};
pub use plan::{ExecutionStep, ProbeDefinition, ProbeType, ToolPlan};
pub use policy::{
    base_approval_for_intent, ApprovalRequirement, PolicyAuthorizationToken, PolicyConfiguration,
    PolicyConstraint, PolicyDecision, PolicyUpdateScope, TierPolicy,
};
pub use risk::{RiskAssessment, RiskContext, RiskDimension, RiskDimensions, RiskReason, RiskTier};
pub use token::{
    ApprovalSession, ApprovalType, AuthorizationToken, CollectedSignature, ConsumedEntry,
    ModelCallToken, SignerType,
};
pub use trust::TrustEpochState;
pub use verify::{ProbeOutcome, ReversibilityAssessment, VerificationResult};

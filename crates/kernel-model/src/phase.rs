use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::ToolPlan;
use crate::policy::PolicyDecision;
use crate::risk::RiskAssessment;
use crate::verify::VerificationResult;

/// The pipeline state. Transitions are monotonic within a request except
/// that `halted` is absorbing (reachable only from emergency stop or
/// integrity failure) and `idle` is re-enterable only via explicit resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelPhase {
    Idle,
    Halted,
    Intake,
    Classify,
    RiskScore,
    ReversibilityCheck,
    Probes,
    PolicyMapping,
    Approval,
    AwaitingApproval,
    Execute,
    LogEvidence,
    Complete,
}

/// Parks a ToolPlan awaiting human approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPlanContext {
    pub plan: ToolPlan,
    pub risk_assessment: RiskAssessment,
    pub verification_result: VerificationResult,
    pub policy_decision: PolicyDecision,
    pub created_at: DateTime<Utc>,
}

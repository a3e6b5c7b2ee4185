use kernel_model::{ApprovalType, KernelPhase};
use uuid::Uuid;

/// Every terminal or semi-terminal state `execute`/`authorize`/`deny` can
/// return. Distinct from [`kernel_model::KernelError`]: that enum is for
/// the four named denial categories in §7, while this one also covers the
/// non-error outcomes (completed, pending, cooldown) a caller branches on.
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Auto-approved (low tier, no preview requirement) and recorded.
    Completed { plan_id: Uuid },
    /// Parked awaiting a human decision.
    PendingApproval { plan_id: Uuid },
    /// A plan's cooldown window has not yet elapsed; the plan was not built.
    CooldownActive {
        intent_key: String,
        remaining_seconds: i64,
    },
    /// Verification or policy mapping pushed the plan back to a human even
    /// though risk tier alone would not have required it (e.g. confidence
    /// below threshold).
    Escalated {
        plan_id: Uuid,
        phase: KernelPhase,
        reason: String,
    },
    /// The caller, a quorum signer, or emergency stop rejected the plan.
    Denied {
        plan_id: Option<Uuid>,
        reason: String,
    },
    /// A phase failed outright (bad intake, a required probe failing).
    Failed { phase: KernelPhase, reason: String },
}

/// What a host supplies back to `authorize()` once a human has decided.
#[derive(Debug, Clone)]
pub struct ApprovalInput {
    pub approval_type: ApprovalType,
}

impl ApprovalInput {
    pub fn new(approval_type: ApprovalType) -> Self {
        Self { approval_type }
    }
}

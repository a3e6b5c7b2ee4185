use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::intent::IntentType;
use crate::risk::RiskTier;

/// The minimum approval shape an `IntentType` demands before any risk-based
/// escalation is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequirement {
    pub approvals_required: u32,
    pub biometric_required: bool,
    pub cooldown_seconds: u64,
    pub signers_required: u32,
    pub preview_required: bool,
}

/// A constraint attached to a decision in addition to the base approval
/// shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyConstraint {
    AuditRequired,
    RateLimit,
    Cooldown,
    TimeWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub tier: RiskTier,
    pub requirement: ApprovalRequirement,
    pub constraints: Vec<PolicyConstraint>,
}

/// One row of the configurable approval matrix, per tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPolicy {
    pub approvals_required: u32,
    pub biometric_required: bool,
    pub min_cooldown_seconds: u64,
    pub signers_required: u32,
    pub preview_required: bool,
}

/// Locked, serializable policy configuration. Mutation requires a
/// `PolicyAuthorizationToken` and fails closed otherwise (enforced by
/// `kernel-policy`, not by this struct).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfiguration {
    pub tiers: HashMap<String, TierPolicy>,
}

impl PolicyConfiguration {
    pub fn tier_key(tier: RiskTier) -> &'static str {
        match tier {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        }
    }

    pub fn tier_policy(&self, tier: RiskTier) -> &TierPolicy {
        self.tiers
            .get(Self::tier_key(tier))
            .expect("every tier must be present in a valid configuration")
    }

    /// The approval matrix from §4.3, table form.
    pub fn default_preset() -> Self {
        let mut tiers = HashMap::new();
        tiers.insert(
            "low".to_string(),
            TierPolicy {
                approvals_required: 0,
                biometric_required: false,
                min_cooldown_seconds: 0,
                signers_required: 0,
                preview_required: false,
            },
        );
        tiers.insert(
            "medium".to_string(),
            TierPolicy {
                approvals_required: 1,
                biometric_required: false,
                min_cooldown_seconds: 0,
                signers_required: 1,
                preview_required: true,
            },
        );
        tiers.insert(
            "high".to_string(),
            TierPolicy {
                approvals_required: 1,
                biometric_required: true,
                min_cooldown_seconds: 10,
                signers_required: 1,
                preview_required: true,
            },
        );
        tiers.insert(
            "critical".to_string(),
            TierPolicy {
                approvals_required: 2,
                biometric_required: true,
                min_cooldown_seconds: 30,
                signers_required: 2,
                preview_required: true,
            },
        );
        Self { tiers }
    }

    /// The "strict" preset: same floors as `default`, but with every
    /// cooldown doubled and previews always required from medium up, for
    /// hosts that want a more conservative baseline without hand-editing
    /// the matrix.
    pub fn strict_preset() -> Self {
        let mut cfg = Self::default_preset();
        for tier in cfg.tiers.values_mut() {
            tier.min_cooldown_seconds *= 2;
            if tier.approvals_required > 0 {
                tier.preview_required = true;
            }
        }
        cfg
    }
}

/// Base approval shape keyed purely by `IntentType`, independent of the
/// risk assessment. `baseApprovalForIntent` in §4.3.
pub fn base_approval_for_intent(intent_type: IntentType) -> ApprovalRequirement {
    if intent_type.is_mutation() {
        ApprovalRequirement {
            approvals_required: 1,
            biometric_required: false,
            cooldown_seconds: 0,
            signers_required: 1,
            preview_required: intent_type.is_external_communication(),
        }
    } else {
        ApprovalRequirement {
            approvals_required: 0,
            biometric_required: false,
            cooldown_seconds: 0,
            signers_required: 0,
            preview_required: false,
        }
    }
}

/// Scope token carried by a `PolicyAuthorizationToken`, gating configuration
/// updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyUpdateScope {
    PolicyUpdate,
    EmergencyOverride,
    FullAccess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAuthorizationToken {
    pub scope: PolicyUpdateScope,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

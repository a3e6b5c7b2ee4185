//! Policy Engine (C9): maps a risk assessment to approval requirements and
//! constraints, under a locked, explicitly-versioned configuration.
//! Quorum signer-set requirements (C14) live in the [`quorum`] submodule,
//! co-located here because they are policy data, not pipeline state.

pub mod quorum;

use chrono::Utc;
use kernel_model::{
    base_approval_for_intent, ApprovalRequirement, IntentType, PolicyAuthorizationToken,
    PolicyConfiguration, PolicyConstraint, PolicyDecision, PolicyUpdateScope, RiskAssessment,
    RiskDimension, RiskTier,
};

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("configuration update rejected: token scope {0:?} cannot update policy")]
    InsufficientScope(PolicyUpdateScope),
    #[error("configuration update rejected: authorization token expired")]
    TokenExpired,
}

pub struct PolicyEngine {
    configuration: PolicyConfiguration,
}

impl PolicyEngine {
    pub fn new(configuration: PolicyConfiguration) -> Self {
        Self { configuration }
    }

    pub fn default_preset() -> Self {
        Self::new(PolicyConfiguration::default_preset())
    }

    pub fn configuration(&self) -> &PolicyConfiguration {
        &self.configuration
    }

    /// Updates require a `PolicyAuthorizationToken` and fail closed
    /// otherwise, per §6.
    pub fn apply_update(
        &mut self,
        new_configuration: PolicyConfiguration,
        token: &PolicyAuthorizationToken,
    ) -> Result<(), PolicyError> {
        if token.expires_at <= Utc::now() {
            return Err(PolicyError::TokenExpired);
        }
        match token.scope {
            PolicyUpdateScope::PolicyUpdate
            | PolicyUpdateScope::EmergencyOverride
            | PolicyUpdateScope::FullAccess => {
                self.configuration = new_configuration;
                tracing::info!("policy configuration updated");
                Ok(())
            }
        }
    }

    pub fn base_approval_for_intent(&self, intent_type: IntentType) -> ApprovalRequirement {
        base_approval_for_intent(intent_type)
    }

    /// `mapToApproval(RiskAssessment) → PolicyDecision`, applying the
    /// approval matrix, the high-tier reversibility escalation rule, and
    /// the critical-tier floor, per §4.3.
    pub fn map_to_approval(&self, assessment: &RiskAssessment) -> PolicyDecision {
        let tier = assessment.tier;
        let tier_policy = self.configuration.tier_policy(tier);

        let mut requirement = ApprovalRequirement {
            approvals_required: tier_policy.approvals_required,
            biometric_required: tier_policy.biometric_required,
            cooldown_seconds: tier_policy.min_cooldown_seconds,
            signers_required: tier_policy.signers_required,
            preview_required: tier_policy.preview_required,
        };

        // Escalation: reversibility dimension > 50 at tier `high` forces
        // biometric + >=10s cooldown + preview, regardless of configuration.
        if tier == RiskTier::High && assessment.dimensions.get(RiskDimension::Reversibility) > 50 {
            requirement.biometric_required = true;
            requirement.cooldown_seconds = requirement.cooldown_seconds.max(10);
            requirement.preview_required = true;
        }

        // Critical is always enforced to at least the published floor,
        // even if a looser configuration was loaded.
        if tier == RiskTier::Critical {
            requirement.approvals_required = requirement.approvals_required.max(2);
            requirement.biometric_required = true;
            requirement.cooldown_seconds = requirement.cooldown_seconds.max(30);
            requirement.signers_required = requirement.signers_required.max(2);
            requirement.preview_required = true;
        }

        let mut constraints = vec![PolicyConstraint::AuditRequired];
        if assessment.dimensions.get(RiskDimension::External) > 50 {
            constraints.push(PolicyConstraint::RateLimit);
        }
        if assessment.dimensions.get(RiskDimension::Reversibility) > 70 {
            constraints.push(PolicyConstraint::Cooldown);
        }
        if tier >= RiskTier::High {
            constraints.push(PolicyConstraint::TimeWindow);
        }

        PolicyDecision {
            tier,
            requirement,
            constraints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_model::{RiskDimensions, RiskReason};

    fn assessment(tier: RiskTier, reversibility: u8) -> RiskAssessment {
        RiskAssessment {
            dimensions: RiskDimensions {
                reversibility,
                ..Default::default()
            },
            total: match tier {
                RiskTier::Low => 10,
                RiskTier::Medium => 40,
                RiskTier::High => 60,
                RiskTier::Critical => 90,
            },
            tier,
            reasons: vec![RiskReason {
                dimension: RiskDimension::Reversibility,
                description: "test".into(),
                score_contribution: reversibility as i32,
            }],
        }
    }

    #[test]
    fn low_tier_requires_nothing() {
        let engine = PolicyEngine::default_preset();
        let decision = engine.map_to_approval(&assessment(RiskTier::Low, 0));
        assert_eq!(decision.requirement.approvals_required, 0);
        assert!(!decision.requirement.biometric_required);
    }

    #[test]
    fn high_tier_with_high_reversibility_forces_biometric_and_cooldown() {
        let engine = PolicyEngine::default_preset();
        let decision = engine.map_to_approval(&assessment(RiskTier::High, 80));
        assert!(decision.requirement.biometric_required);
        assert!(decision.requirement.cooldown_seconds >= 10);
        assert!(decision.requirement.preview_required);
    }

    #[test]
    fn critical_tier_floor_cannot_be_loosened() {
        let mut loose = PolicyConfiguration::default_preset();
        loose.tiers.get_mut("critical").unwrap().approvals_required = 0;
        loose.tiers.get_mut("critical").unwrap().signers_required = 0;
        let engine = PolicyEngine::new(loose);
        let decision = engine.map_to_approval(&assessment(RiskTier::Critical, 0));
        assert!(decision.requirement.approvals_required >= 2);
        assert!(decision.requirement.signers_required >= 2);
    }
}

//! Risk Engine (C8): a pure, deterministic function from a classified
//! intent to a weighted risk assessment. No I/O, no randomness, no opaque
//! scoring — every non-zero dimension is backed by at least one
//! [`RiskReason`] whose contributions (clipped per dimension) reproduce the
//! reported score.

use kernel_model::{
    IntentType, ReversibilityClass, RiskAssessment, RiskContext, RiskDimension, RiskDimensions,
    RiskReason, RiskTier, Sensitivity,
};

struct Accumulator {
    score: i32,
    reasons: Vec<RiskReason>,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            score: 0,
            reasons: Vec::new(),
        }
    }

    fn add(&mut self, dimension: RiskDimension, amount: i32, description: &str) {
        if amount == 0 {
            return;
        }
        let before = self.score;
        self.score = (self.score + amount).clamp(0, 100);
        let applied = self.score - before;
        if applied != 0 {
            self.reasons.push(RiskReason {
                dimension,
                description: description.to_string(),
                score_contribution: applied,
            });
        }
    }

    fn finish(self) -> (u8, Vec<RiskReason>) {
        (self.score as u8, self.reasons)
    }
}

/// `assess(RiskContext) → RiskAssessment`. Walks the fixed rule table per
/// dimension, per §4.2.
pub fn assess(ctx: &RiskContext) -> RiskAssessment {
    let mut financial = Accumulator::new();
    if ctx.involves_payment {
        financial.add(RiskDimension::Financial, 80, "action involves a payment");
    }

    let mut external = Accumulator::new();
    if ctx.intent_type.is_external_communication() {
        external.add(
            RiskDimension::External,
            40,
            "action communicates with an external party",
        );
    }
    if ctx.external_recipient_count > 1 {
        let extra = (ctx.external_recipient_count - 1).min(3) as i32 * 10;
        external.add(
            RiskDimension::External,
            extra,
            "multiple external recipients beyond the first",
        );
    }

    let mut data = Accumulator::new();
    match ctx.sensitivity {
        Sensitivity::Critical => data.add(
            RiskDimension::Data,
            90,
            "content contains password/secret markers",
        ),
        Sensitivity::High => data.add(
            RiskDimension::Data,
            60,
            "content contains health/medical markers",
        ),
        Sensitivity::Medium => data.add(
            RiskDimension::Data,
            30,
            "content contains PII markers (email, phone, or address)",
        ),
        Sensitivity::Low => {}
    }

    let mut mutation = Accumulator::new();
    if ctx.intent_type.is_mutation() {
        mutation.add(RiskDimension::Mutation, 50, "action mutates state");
    }
    if ctx.affected_record_count > 1 {
        let extra = ((ctx.affected_record_count - 1).min(3) * 10) as i32;
        mutation.add(
            RiskDimension::Mutation,
            extra,
            "action affects multiple records",
        );
    }

    let mut reversibility = Accumulator::new();
    let default_class = ctx.intent_type.default_reversibility();
    if default_class == ReversibilityClass::Irreversible {
        reversibility.add(
            RiskDimension::Reversibility,
            60,
            "action is irreversible by default",
        );
    }
    if default_class != ReversibilityClass::Reversible && !ctx.has_rollback_plan {
        reversibility.add(
            RiskDimension::Reversibility,
            20,
            "no rollback action configured for a non-reversible action",
        );
    }

    let mut scope = Accumulator::new();
    if ctx.affected_record_count > 10 {
        scope.add(
            RiskDimension::Scope,
            30,
            "action affects a large number of records",
        );
    } else if ctx.affected_record_count > 1 {
        scope.add(RiskDimension::Scope, 10, "action affects more than one record");
    }

    let (financial_score, mut reasons) = financial.finish();
    let (external_score, external_reasons) = external.finish();
    let (data_score, data_reasons) = data.finish();
    let (mutation_score, mutation_reasons) = mutation.finish();
    let (reversibility_score, reversibility_reasons) = reversibility.finish();
    let (scope_score, scope_reasons) = scope.finish();

    reasons.extend(external_reasons);
    reasons.extend(data_reasons);
    reasons.extend(mutation_reasons);
    reasons.extend(reversibility_reasons);
    reasons.extend(scope_reasons);

    let dimensions = RiskDimensions {
        financial: financial_score,
        external: external_score,
        data: data_score,
        mutation: mutation_score,
        reversibility: reversibility_score,
        scope: scope_score,
    };
    let total = dimensions.weighted_total();
    let tier = RiskTier::from_total(total);

    RiskAssessment {
        dimensions,
        total,
        tier,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx(intent_type: IntentType) -> RiskContext {
        RiskContext {
            intent_type,
            sensitivity: Sensitivity::Low,
            involves_payment: false,
            external_recipient_count: 0,
            has_rollback_plan: false,
            affected_record_count: 1,
        }
    }

    #[test]
    fn read_calendar_is_low_risk() {
        let assessment = assess(&base_ctx(IntentType::ReadCalendar));
        assert_eq!(assessment.tier, RiskTier::Low);
        assert_eq!(assessment.total, 0);
    }

    #[test]
    fn send_email_with_pii_and_payment_escalates() {
        let mut ctx = base_ctx(IntentType::SendEmail);
        ctx.sensitivity = Sensitivity::Medium;
        ctx.involves_payment = true;
        ctx.external_recipient_count = 3;
        let assessment = assess(&ctx);
        assert!(assessment.tier >= RiskTier::Medium);
        assert!(!assessment.reasons.is_empty());
    }

    #[test]
    fn every_nonzero_dimension_has_a_reason() {
        let mut ctx = base_ctx(IntentType::DatabaseMutation);
        ctx.affected_record_count = 20;
        let assessment = assess(&ctx);
        for dim in [
            RiskDimension::Mutation,
            RiskDimension::Reversibility,
            RiskDimension::Scope,
        ] {
            if assessment.dimensions.get(dim) > 0 {
                assert!(assessment.reasons.iter().any(|r| r.dimension == dim));
            }
        }
    }

    #[test]
    fn assess_is_pure() {
        let ctx = base_ctx(IntentType::CalendarDelete);
        let a = assess(&ctx);
        let b = assess(&ctx);
        assert_eq!(a.total, b.total);
        assert_eq!(a.tier, b.tier);
    }
}

use serde::{Deserialize, Serialize};

/// One of the six scored dimensions of blast radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskDimension {
    Financial,
    External,
    Data,
    Mutation,
    Reversibility,
    Scope,
}

impl RiskDimension {
    /// Weight out of 100, fixed per §4.2.
    pub fn weight(self) -> u32 {
        match self {
            RiskDimension::Financial => 20,
            RiskDimension::External => 25,
            RiskDimension::Data => 20,
            RiskDimension::Mutation => 15,
            RiskDimension::Reversibility => 15,
            RiskDimension::Scope => 5,
        }
    }
}

/// An explainable contribution to a dimension's score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReason {
    pub dimension: RiskDimension,
    pub description: String,
    pub score_contribution: i32,
}

/// Six integer scores in `[0, 100]`, one per dimension.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskDimensions {
    pub financial: u8,
    pub external: u8,
    pub data: u8,
    pub mutation: u8,
    pub reversibility: u8,
    pub scope: u8,
}

impl RiskDimensions {
    pub fn get(&self, dimension: RiskDimension) -> u8 {
        match dimension {
            RiskDimension::Financial => self.financial,
            RiskDimension::External => self.external,
            RiskDimension::Data => self.data,
            RiskDimension::Mutation => self.mutation,
            RiskDimension::Reversibility => self.reversibility,
            RiskDimension::Scope => self.scope,
        }
    }

    /// Weighted sum as specified: `Σ dim_i × weight_i ÷ 100`, rounded
    /// half-to-zero at the division (per P8).
    pub fn weighted_total(&self) -> u8 {
        let sum: u32 = [
            RiskDimension::Financial,
            RiskDimension::External,
            RiskDimension::Data,
            RiskDimension::Mutation,
            RiskDimension::Reversibility,
            RiskDimension::Scope,
        ]
        .iter()
        .map(|d| self.get(*d) as u32 * d.weight())
        .sum();
        (sum / 100).min(100) as u8
    }
}

/// `{ low, medium, high, critical }`, derived from the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// Fixed thresholds on the total weighted score.
    pub fn from_total(total: u8) -> Self {
        match total {
            0..=24 => RiskTier::Low,
            25..=54 => RiskTier::Medium,
            55..=79 => RiskTier::High,
            _ => RiskTier::Critical,
        }
    }
}

/// The risk engine's full output: dimension scores, weighted total, tier,
/// and the ordered reasons whose (clipped) contributions reproduce each
/// dimension's score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub dimensions: RiskDimensions,
    pub total: u8,
    pub tier: RiskTier,
    pub reasons: Vec<RiskReason>,
}

/// Inputs the risk engine needs to evaluate one intent. Built by the
/// pipeline at phase *risk_score* from the classification step's output.
#[derive(Debug, Clone)]
pub struct RiskContext {
    pub intent_type: crate::intent::IntentType,
    pub sensitivity: crate::intent::Sensitivity,
    pub involves_payment: bool,
    pub external_recipient_count: u32,
    pub has_rollback_plan: bool,
    pub affected_record_count: u32,
}

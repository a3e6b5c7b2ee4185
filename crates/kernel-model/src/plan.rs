use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::intent::{IntentType, ReversibilityClass};
use crate::risk::{RiskAssessment, RiskReason};

/// A read-only verification of an external precondition. Probes MUST be
/// idempotent and retry-safe; they MUST NOT mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeType {
    PermissionCheck,
    ObjectExists,
    EndpointHealth,
    QuotaCheck,
    ConnectionValid,
    ResourceAvailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeDefinition {
    pub probe_type: ProbeType,
    pub target: String,
    pub is_required: bool,
}

/// One step of a plan's execution, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub order: u32,
    pub action: String,
    pub description: String,
    pub is_mutation: bool,
    pub rollback_action: Option<String>,
}

/// The canonical object representing a candidate action. Immutable and
/// signed once verified; a ToolPlan's signature MUST verify before any
/// downstream use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPlan {
    pub id: Uuid,
    pub intent_type: IntentType,
    pub summary: String,
    pub target: Option<String>,
    pub originating_action: String,
    pub risk_total: u8,
    pub risk_reasons: Vec<RiskReason>,
    pub reversibility: ReversibilityClass,
    pub reversibility_reason: String,
    pub steps: Vec<ExecutionStep>,
    pub probes: Vec<ProbeDefinition>,
    /// HMAC-SHA-256 over [`ToolPlan::canonical_bytes`], hex-encoded.
    pub signature: String,
}

impl ToolPlan {
    /// A length-prefixed, stable-field-order byte encoding used both as the
    /// signing input and as the basis for `planHash`. This resolves the
    /// open question in spec design notes: rather than the weak
    /// `planId + summary + stepCount` concatenation, every field that
    /// participates in the plan's meaning is framed and hashed, so that
    /// step content (not just step count) is bound into the signature.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut fields: Vec<Vec<u8>> = Vec::new();
        fields.push(self.id.as_bytes().to_vec());
        fields.push(format!("{:?}", self.intent_type).into_bytes());
        fields.push(self.summary.clone().into_bytes());
        fields.push(self.target.clone().unwrap_or_default().into_bytes());
        fields.push(format!("{:?}", self.reversibility).into_bytes());
        for step in &self.steps {
            fields.push(
                format!(
                    "{}|{}|{}|{}|{}",
                    step.order,
                    step.action,
                    step.description,
                    step.is_mutation,
                    step.rollback_action.as_deref().unwrap_or("")
                )
                .into_bytes(),
            );
        }
        for probe in &self.probes {
            fields.push(
                format!("{:?}|{}|{}", probe.probe_type, probe.target, probe.is_required)
                    .into_bytes(),
            );
        }

        let mut out = Vec::new();
        for field in &fields {
            out.extend_from_slice(&(field.len() as u64).to_be_bytes());
            out.extend_from_slice(field);
        }
        out
    }

    pub fn plan_hash(&self) -> kernel_crypto::Digest32 {
        kernel_crypto::sha256(&self.canonical_bytes())
    }

    pub fn verify_signature(&self, mac_key: &kernel_crypto::MacKey) -> bool {
        let Ok(expected) = kernel_crypto::hmac_sign(mac_key, &self.canonical_bytes()) else {
            return false;
        };
        let Ok(actual) = hex_decode(&self.signature) else {
            return false;
        };
        actual.len() == 32 && expected.as_slice() == actual.as_slice()
    }
}

pub(crate) fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    for i in (0..s.len()).step_by(2) {
        out.push(u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ())?);
    }
    Ok(out)
}

impl From<&RiskAssessment> for (u8, Vec<RiskReason>) {
    fn from(a: &RiskAssessment) -> Self {
        (a.total, a.reasons.clone())
    }
}

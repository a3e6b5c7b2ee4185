use serde::{Deserialize, Serialize};

use crate::intent::ReversibilityClass;
use crate::plan::{ProbeDefinition, ProbeType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversibilityAssessment {
    pub class: ReversibilityClass,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub probe: ProbeDefinition,
    pub passed: bool,
    pub retry_count: u32,
    pub detail: Option<String>,
}

/// Output of running every probe in a plan. `confidence` is the pass rate
/// over every probe, required or optional (1.0 when there are none).
/// `passed` is true iff the plan's signature is valid, every required
/// probe passed, and confidence is at least 0.8 — so an optional probe's
/// failure alone can still push a plan to escalation even though every
/// required probe passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub signature_valid: bool,
    pub reversibility: ReversibilityAssessment,
    pub probe_outcomes: Vec<ProbeOutcome>,
    pub confidence: f64,
    pub passed: bool,
}

impl VerificationResult {
    pub fn required_probe_stats(outcomes: &[ProbeOutcome]) -> (u32, u32) {
        let required: Vec<&ProbeOutcome> = outcomes.iter().filter(|o| o.probe.is_required).collect();
        let total = required.len() as u32;
        let passed = required.iter().filter(|o| o.passed).count() as u32;
        (passed, total)
    }

    /// Confidence is the pass rate over *every* probe, required or not, so
    /// an optional probe's failure can still lower confidence enough to
    /// escalate even when every required probe passed. A plan with no
    /// probes at all has full confidence (B4).
    pub fn compute_confidence(outcomes: &[ProbeOutcome]) -> f64 {
        if outcomes.is_empty() {
            1.0
        } else {
            let passed = outcomes.iter().filter(|o| o.passed).count();
            passed as f64 / outcomes.len() as f64
        }
    }
}

impl ProbeType {
    pub fn default_description(self) -> &'static str {
        match self {
            ProbeType::PermissionCheck => "verifies the caller holds the required permission",
            ProbeType::ObjectExists => "verifies the target object exists",
            ProbeType::EndpointHealth => "verifies the external endpoint is reachable",
            ProbeType::QuotaCheck => "verifies remaining quota covers this action",
            ProbeType::ConnectionValid => "verifies the stored connection credentials are valid",
            ProbeType::ResourceAvailable => "verifies the required resource is available",
        }
    }
}

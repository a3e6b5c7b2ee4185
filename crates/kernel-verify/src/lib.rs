//! Verification Engine (C10): classifies reversibility, generates the
//! fixed probe set for an intent, and runs probes with retry/back-off.
//! Probe backing checks are pluggable via [`ProbeChecker`]; the contract
//! that matters — read-only, retry-safe, 10s deadline, at most 2 retries —
//! is enforced here regardless of what a given checker actually inspects.

use std::time::Duration;

use async_trait::async_trait;
use kernel_model::{
    IntentType, ProbeDefinition, ProbeOutcome, ProbeType, ReversibilityAssessment,
    ReversibilityClass, ToolPlan, VerificationResult,
};

const MAX_RETRIES: u32 = 2;
const PROBE_DEADLINE: Duration = Duration::from_secs(10);
const BASE_BACKOFF_MS: u64 = 100;
const CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Backing check for one probe. The stub implementation (the only one this
/// crate ships) returns `Ok(true)` unconditionally, matching the source's
/// documented probe stubs; real deployments plug in a checker that
/// actually calls the capability (permission API, object lookup, endpoint
/// ping) being probed.
#[async_trait]
pub trait ProbeChecker: Send + Sync {
    async fn check(&self, probe: &ProbeDefinition) -> Result<bool, String>;
}

pub struct AlwaysPassChecker;

#[async_trait]
impl ProbeChecker for AlwaysPassChecker {
    async fn check(&self, _probe: &ProbeDefinition) -> Result<bool, String> {
        Ok(true)
    }
}

pub struct VerificationEngine<C: ProbeChecker> {
    checker: C,
}

impl VerificationEngine<AlwaysPassChecker> {
    pub fn stub() -> Self {
        Self {
            checker: AlwaysPassChecker,
        }
    }
}

impl<C: ProbeChecker> VerificationEngine<C> {
    pub fn new(checker: C) -> Self {
        Self { checker }
    }

    /// `classifyReversibility(IntentType, ReversibilityContext)`, per the
    /// informative table in §4.4.
    pub fn classify_reversibility(
        &self,
        intent_type: IntentType,
        has_backup: bool,
    ) -> ReversibilityAssessment {
        use IntentType::*;
        let (class, reason) = match intent_type {
            DraftMessage | DraftReminder | ReadCalendar | ReadContacts => (
                ReversibilityClass::Reversible,
                "drafts, reminders, and reads carry no lasting effect".to_string(),
            ),
            CalendarCreate | CalendarUpdate => (
                ReversibilityClass::PartiallyReversible,
                "calendar mutations can be edited or undone manually".to_string(),
            ),
            CalendarDelete | FileDelete => {
                if has_backup {
                    (
                        ReversibilityClass::PartiallyReversible,
                        "a backup exists to restore the deleted item".to_string(),
                    )
                } else {
                    (
                        ReversibilityClass::Irreversible,
                        "deletion has no backup to restore from".to_string(),
                    )
                }
            }
            SendEmail | ExternalApiCall | DatabaseMutation | FileWrite => (
                ReversibilityClass::Irreversible,
                "action has an external or durable effect with no rollback path".to_string(),
            ),
            SystemConfig | Unknown => (
                ReversibilityClass::Irreversible,
                "unrecognized or system-level action is irreversible by safety default"
                    .to_string(),
            ),
        };
        ReversibilityAssessment { class, reason }
    }

    /// `generateProbes(IntentType, target) → [ProbeDefinition]`, a fixed
    /// expansion table per intent type.
    pub fn generate_probes(&self, intent_type: IntentType, target: Option<&str>) -> Vec<ProbeDefinition> {
        let target = target.unwrap_or_default().to_string();
        use IntentType::*;
        match intent_type {
            ReadCalendar | ReadContacts => vec![ProbeDefinition {
                probe_type: ProbeType::PermissionCheck,
                target,
                is_required: true,
            }],
            DraftMessage | DraftReminder => vec![ProbeDefinition {
                probe_type: ProbeType::PermissionCheck,
                target,
                is_required: false,
            }],
            CalendarCreate => vec![ProbeDefinition {
                probe_type: ProbeType::PermissionCheck,
                target,
                is_required: true,
            }],
            CalendarUpdate => vec![
                ProbeDefinition {
                    probe_type: ProbeType::PermissionCheck,
                    target: target.clone(),
                    is_required: true,
                },
                // Not required: a missing target should lower confidence and
                // escalate to a human rather than hard-fail outright, since
                // an update to a since-deleted event is recoverable by
                // re-creating it.
                ProbeDefinition {
                    probe_type: ProbeType::ObjectExists,
                    target,
                    is_required: false,
                },
            ],
            CalendarDelete | FileDelete => vec![
                ProbeDefinition {
                    probe_type: ProbeType::PermissionCheck,
                    target: target.clone(),
                    is_required: true,
                },
                ProbeDefinition {
                    probe_type: ProbeType::ObjectExists,
                    target,
                    is_required: true,
                },
            ],
            SendEmail | ExternalApiCall => vec![
                ProbeDefinition {
                    probe_type: ProbeType::ConnectionValid,
                    target: target.clone(),
                    is_required: true,
                },
                ProbeDefinition {
                    probe_type: ProbeType::EndpointHealth,
                    target: target.clone(),
                    is_required: true,
                },
                ProbeDefinition {
                    probe_type: ProbeType::QuotaCheck,
                    target,
                    is_required: false,
                },
            ],
            DatabaseMutation | FileWrite => vec![
                ProbeDefinition {
                    probe_type: ProbeType::PermissionCheck,
                    target: target.clone(),
                    is_required: true,
                },
                ProbeDefinition {
                    probe_type: ProbeType::ResourceAvailable,
                    target,
                    is_required: true,
                },
            ],
            SystemConfig | Unknown => vec![ProbeDefinition {
                probe_type: ProbeType::PermissionCheck,
                target,
                is_required: true,
            }],
        }
    }

    /// Runs one probe to completion: up to 2 retries with exponential
    /// back-off (~100ms × 2^attempt), bounded by a 10s per-probe deadline.
    async fn run_probe(&self, probe: &ProbeDefinition) -> ProbeOutcome {
        let deadline = tokio::time::Instant::now() + PROBE_DEADLINE;
        let mut retry_count = 0;
        loop {
            let attempt = tokio::time::timeout_at(deadline, self.checker.check(probe)).await;
            match attempt {
                Ok(Ok(true)) => {
                    return ProbeOutcome {
                        probe: probe.clone(),
                        passed: true,
                        retry_count,
                        detail: None,
                    };
                }
                Ok(Ok(false)) | Ok(Err(_)) => {
                    if retry_count >= MAX_RETRIES || tokio::time::Instant::now() >= deadline {
                        let detail = match attempt {
                            Ok(Err(e)) => Some(e),
                            _ => Some("probe reported failure".to_string()),
                        };
                        return ProbeOutcome {
                            probe: probe.clone(),
                            passed: false,
                            retry_count,
                            detail,
                        };
                    }
                    let backoff = BASE_BACKOFF_MS * 2u64.pow(retry_count);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    retry_count += 1;
                }
                Err(_timeout) => {
                    return ProbeOutcome {
                        probe: probe.clone(),
                        passed: false,
                        retry_count,
                        detail: Some("probe deadline exceeded".to_string()),
                    };
                }
            }
        }
    }

    /// `verify(ToolPlan) → VerificationResult`. (a) checks the plan
    /// signature, short-circuiting at confidence 0 on failure; (b) reports
    /// reversibility informationally; (c) runs every probe and folds the
    /// outcomes into a confidence score.
    pub async fn verify(&self, plan: &ToolPlan, mac_key: &MacKeyRef<'_>) -> VerificationResult {
        let signature_valid = plan.verify_signature(mac_key.0);
        let reversibility = ReversibilityAssessment {
            class: plan.reversibility,
            reason: plan.reversibility_reason.clone(),
        };

        if !signature_valid {
            return VerificationResult {
                signature_valid: false,
                reversibility,
                probe_outcomes: Vec::new(),
                confidence: 0.0,
                passed: false,
            };
        }

        let mut outcomes = Vec::with_capacity(plan.probes.len());
        for probe in &plan.probes {
            outcomes.push(self.run_probe(probe).await);
        }

        let confidence = VerificationResult::compute_confidence(&outcomes);
        let all_required_passed = outcomes.iter().filter(|o| o.probe.is_required).all(|o| o.passed);
        let passed = signature_valid && all_required_passed && confidence >= CONFIDENCE_THRESHOLD;

        if !passed {
            tracing::warn!(confidence, all_required_passed, "plan verification did not pass");
        }

        VerificationResult {
            signature_valid,
            reversibility,
            probe_outcomes: outcomes,
            confidence,
            passed,
        }
    }
}


/// A borrow wrapper so `verify` does not need to depend on `kernel-crypto`'s
/// concrete key type in its public signature beyond a reference.
pub struct MacKeyRef<'a>(pub &'a kernel_crypto::MacKey);

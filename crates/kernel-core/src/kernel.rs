//! Decision Pipeline (C11): the composition root wiring every other
//! component into the ten-phase flow of §4.1. Mirrors the shape of the
//! teacher's own `Executor` (`nexus-core::executor`) — a struct holding a
//! clock and its collaborators, driving a fixed sequence of phases per
//! request rather than dispatching through a generic scheduler.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use kernel_ledger::{EvidenceLedger, EvidenceMirror, EvidencePayload, MirrorTransport};
use kernel_model::{
    ApprovalSession, ApprovalType, CollectedSignature, ExecutionIntent, IntegrityPosture,
    KernelPhase, ModelCallToken, PendingPlanContext, PolicyViolationKind, RiskTier, SignerType,
    ToolPlan,
};
use kernel_policy::PolicyEngine;
use kernel_token::{ConsumedTokenStore, TokenMint};
use kernel_trust::{DeviceRegistry, TrustEpochManager};
use kernel_vault::SigningVault;
use kernel_verify::{MacKeyRef, ProbeChecker, VerificationEngine};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::KernelConfig;
use crate::events::{EventBus, KernelEvent};
use crate::planning::{build_risk_context, build_steps};
use crate::result::{ApprovalInput, ExecutionResult};
use crate::CoreError;

/// Every collaborator the decision pipeline needs, wired together once at
/// startup. Generic over the signing vault and the probe checker so a host
/// can swap in its own hardware vault or real probe backing without this
/// crate changing.
pub struct Kernel<V: SigningVault, C: ProbeChecker> {
    vault: Arc<Mutex<V>>,
    trust: Arc<Mutex<TrustEpochManager<V>>>,
    devices: Arc<Mutex<DeviceRegistry>>,
    policy: Mutex<PolicyEngine>,
    verify: VerificationEngine<C>,
    ledger: Mutex<EvidenceLedger<V>>,
    integrity: kernel_integrity::IntegrityGuard<V>,
    token_mint: TokenMint<V>,
    pending_plans: Mutex<HashMap<Uuid, PendingPlanContext>>,
    approved_plans: Mutex<HashMap<Uuid, PendingPlanContext>>,
    /// In-progress quorum sessions, keyed by plan id, accumulated across
    /// one or more [`Self::collect_biometric_approval`] /
    /// [`Self::collect_quorum_signature`] calls until every signer type the
    /// plan's tier requires (`SignerType::required_set`) has signed.
    approval_sessions: Mutex<HashMap<Uuid, ApprovalSession>>,
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
    global_phase: Mutex<KernelPhase>,
    last_integrity: Mutex<kernel_model::IntegrityReport>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    /// Non-reentrancy: `execute` is not safe to run concurrently with
    /// itself on one kernel instance (§5), so every call takes this lock
    /// for its full duration.
    pipeline_lock: tokio::sync::Mutex<()>,
    device_fingerprint: String,
}

impl<V: SigningVault, C: ProbeChecker> Kernel<V, C> {
    /// Opens (or initializes) every durable store under `config.root_dir`,
    /// runs the launch-time integrity check set, and returns a ready
    /// kernel. Fails only on I/O or decode errors — a failed integrity
    /// check is data (`lockdown` posture), not an error here.
    pub fn open(
        config: &KernelConfig,
        vault: V,
        probe_checker: C,
        policy: PolicyEngine,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let vault = Arc::new(Mutex::new(vault));
        let security_dir = config.kernel_security_dir();

        let trust = Arc::new(Mutex::new(TrustEpochManager::open(&security_dir, vault.clone())?));
        let device_fingerprint = vault.lock().device_fingerprint();
        let devices = Arc::new(Mutex::new(DeviceRegistry::open(&security_dir, &device_fingerprint)?));

        let ledger = EvidenceLedger::open(config.evidence_chain_path(), Uuid::new_v4(), trust.clone())?;

        let integrity = kernel_integrity::IntegrityGuard::new(
            &security_dir,
            trust.clone(),
            devices.clone(),
            device_fingerprint.clone(),
        );
        let report = integrity.run_checks(&ledger)?;

        let consumed_auth = Arc::new(Mutex::new(ConsumedTokenStore::open(config.consumed_auth_tokens_path())?));
        let consumed_model = Arc::new(Mutex::new(ConsumedTokenStore::open(config.consumed_model_tokens_path())?));
        let token_mint = TokenMint::new(
            trust.clone(),
            devices.clone(),
            vault.clone(),
            consumed_auth,
            consumed_model,
            device_fingerprint.clone(),
        );

        Ok(Self {
            vault,
            trust,
            devices,
            policy: Mutex::new(policy),
            verify: VerificationEngine::new(probe_checker),
            ledger: Mutex::new(ledger),
            integrity,
            token_mint,
            pending_plans: Mutex::new(HashMap::new()),
            approved_plans: Mutex::new(HashMap::new()),
            approval_sessions: Mutex::new(HashMap::new()),
            cooldowns: Mutex::new(HashMap::new()),
            global_phase: Mutex::new(KernelPhase::Idle),
            last_integrity: Mutex::new(report),
            events: EventBus::new(64),
            clock,
            pipeline_lock: tokio::sync::Mutex::new(()),
            device_fingerprint,
        })
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<KernelEvent> {
        self.events.subscribe()
    }

    /// `lockdown` always wins regardless of the last full check's posture;
    /// `force_lockdown`/`attempt_recovery` can flip it between checks.
    pub fn current_posture(&self) -> IntegrityPosture {
        if self.integrity.is_locked() {
            IntegrityPosture::Lockdown
        } else {
            self.last_integrity.lock().posture
        }
    }

    fn intent_key(intent_type: kernel_model::IntentType, target: Option<&str>) -> String {
        format!("{intent_type:?}|{}", target.unwrap_or_default())
    }

    fn cooldown_remaining(&self, key: &str) -> Option<i64> {
        let until = *self.cooldowns.lock().get(key)?;
        let remaining = (until - self.clock.now()).num_seconds();
        (remaining > 0).then_some(remaining)
    }

    fn set_cooldown(&self, key: &str, seconds: u64) {
        if seconds == 0 {
            return;
        }
        self.cooldowns
            .lock()
            .insert(key.to_string(), self.clock.now() + Duration::seconds(seconds as i64));
    }

    fn log_artifact(&self, description: &str, value: &impl serde::Serialize) -> Result<(), CoreError> {
        let reference = serde_json::to_string(value).map_err(|e| CoreError::Serialize(e.to_string()))?;
        self.ledger.lock().append(
            kernel_model::EvidenceEntryType::Artifact,
            EvidencePayload::Artifact {
                description: description.to_string(),
                reference,
            },
        )?;
        Ok(())
    }

    fn log_execution_chain(&self, plan: &ToolPlan, decision: &str, token_id: Option<Uuid>) -> Result<(), CoreError> {
        self.ledger.lock().append(
            kernel_model::EvidenceEntryType::ExecutionChain,
            EvidencePayload::ExecutionChain {
                plan_id: plan.id,
                plan_hash: plan.plan_hash().to_hex(),
                decision: decision.to_string(),
                token_id,
            },
        )?;
        Ok(())
    }

    fn log_policy_violation(&self, kind: PolicyViolationKind, detail: &str) -> Result<(), CoreError> {
        self.ledger.lock().append(
            kernel_model::EvidenceEntryType::Violation,
            EvidencePayload::PolicyViolation {
                kind,
                detail: detail.to_string(),
            },
        )?;
        Ok(())
    }

    fn log_system_event(&self, message: &str) -> Result<(), CoreError> {
        self.ledger.lock().append(
            kernel_model::EvidenceEntryType::SystemEvent,
            EvidencePayload::SystemEvent {
                message: message.to_string(),
            },
        )?;
        Ok(())
    }

    /// Phases *intake* through *policy_mapping*, plus the cooldown check
    /// that gates *approval*. Returns before any human decision is made;
    /// low-tier plans with no preview requirement are auto-approved inline.
    pub async fn execute(&self, intent: ExecutionIntent) -> ExecutionResult {
        if *self.global_phase.lock() == KernelPhase::Halted {
            return ExecutionResult::Denied {
                plan_id: None,
                reason: "kernel is halted; call resume_from_halt() first".to_string(),
            };
        }
        let _pipeline_guard = self.pipeline_lock.lock().await;

        // Phase: intake
        if intent.action.trim().is_empty() {
            let _ = self.log_policy_violation(PolicyViolationKind::BypassAttempt, "empty action at intake");
            return ExecutionResult::Failed {
                phase: KernelPhase::Intake,
                reason: "action must not be empty".to_string(),
            };
        }
        if self.current_posture() == IntegrityPosture::Lockdown {
            return ExecutionResult::Failed {
                phase: KernelPhase::Intake,
                reason: "integrity guard is in lockdown".to_string(),
            };
        }

        // Phase: classify
        let intent_type = kernel_model::classify_action(&intent.action);
        let sensitivity = kernel_model::classify_sensitivity(&intent.action, &intent.parameters);
        let intent_key = Self::intent_key(intent_type, intent.target.as_deref());

        if let Some(remaining) = self.cooldown_remaining(&intent_key) {
            return ExecutionResult::CooldownActive {
                intent_key,
                remaining_seconds: remaining,
            };
        }

        // Phase: risk_score
        let has_rollback_plan = intent
            .parameters
            .get("hasBackup")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let risk_ctx = build_risk_context(&intent, intent_type, sensitivity, has_rollback_plan);
        let risk_assessment = kernel_risk::assess(&risk_ctx);
        let _ = self.log_artifact("risk_assessment", &risk_assessment);

        // Phase: reversibility_check
        let reversibility = self.verify.classify_reversibility(intent_type, has_rollback_plan);

        // Phase: build plan
        let steps = build_steps(intent_type, &intent.action, intent.target.as_deref());
        let probes = self.verify.generate_probes(intent_type, intent.target.as_deref());
        let mut plan = ToolPlan {
            id: Uuid::new_v4(),
            intent_type,
            summary: intent.action.clone(),
            target: intent.target.clone(),
            originating_action: intent.action.clone(),
            risk_total: risk_assessment.total,
            risk_reasons: risk_assessment.reasons.clone(),
            reversibility: reversibility.class,
            reversibility_reason: reversibility.reason.clone(),
            steps,
            probes,
            signature: String::new(),
        };
        let mac_key = match self.trust.lock().active_mac_key() {
            Ok(k) => k,
            Err(e) => {
                return ExecutionResult::Failed {
                    phase: KernelPhase::Probes,
                    reason: format!("unable to load signing key: {e}"),
                }
            }
        };
        let tag = match kernel_crypto::hmac_sign(&mac_key, &plan.canonical_bytes()) {
            Ok(t) => t,
            Err(e) => {
                return ExecutionResult::Failed {
                    phase: KernelPhase::Probes,
                    reason: format!("unable to sign plan: {e}"),
                }
            }
        };
        plan.signature = tag.iter().map(|b| format!("{b:02x}")).collect();
        let _ = self.log_artifact("tool_plan_created", &plan);

        // Phase: probes (verification engine also re-checks the signature
        // and reversibility it was just given, defense in depth)
        let verification = self.verify.verify(&plan, &MacKeyRef(&mac_key)).await;
        let _ = self.log_artifact("verification_result", &verification);

        let (required_passed, required_total) =
            kernel_model::VerificationResult::required_probe_stats(&verification.probe_outcomes);
        if required_total > 0 && required_passed < required_total {
            let _ = self.log_execution_chain(&plan, "failed", None);
            return ExecutionResult::Failed {
                phase: KernelPhase::Probes,
                reason: "a required probe failed".to_string(),
            };
        }
        if !verification.signature_valid || verification.confidence < 0.8 {
            let _ = self.log_execution_chain(&plan, "escalated", None);
            return ExecutionResult::Escalated {
                plan_id: plan.id,
                phase: KernelPhase::Probes,
                reason: format!(
                    "verification confidence {:.0}% is below the 80% minimum",
                    verification.confidence * 100.0
                ),
            };
        }

        // Phase: policy_mapping
        let decision = self.policy.lock().map_to_approval(&risk_assessment);
        let _ = self.log_artifact("policy_decision", &decision);

        // Phase: approval
        let auto_approve = decision.tier == RiskTier::Low && !decision.requirement.preview_required;
        if auto_approve {
            self.set_cooldown(&intent_key, decision.requirement.cooldown_seconds);
            let _ = self.log_execution_chain(&plan, "completed", None);
            self.approved_plans.lock().insert(
                plan.id,
                PendingPlanContext {
                    plan: plan.clone(),
                    risk_assessment,
                    verification_result: verification,
                    policy_decision: decision,
                    created_at: Utc::now(),
                },
            );
            return ExecutionResult::Completed { plan_id: plan.id };
        }

        let ctx = PendingPlanContext {
            plan: plan.clone(),
            risk_assessment,
            verification_result: verification,
            policy_decision: decision.clone(),
            created_at: Utc::now(),
        };
        self.pending_plans.lock().insert(plan.id, ctx);
        let _ = self.log_execution_chain(&plan, "pendingApproval", None);
        self.events.publish(KernelEvent::PlanPending {
            plan_id: plan.id,
            tier: decision.tier,
        });
        ExecutionResult::PendingApproval { plan_id: plan.id }
    }

    /// Resolves a pending plan with a human decision. Does not mint a
    /// token: per S1, a token is minted only by an explicit, separate call
    /// to [`Self::issue_hardened_token`] or [`Self::collect_biometric_approval`].
    pub fn authorize(&self, plan_id: Uuid, approval: ApprovalInput) -> ExecutionResult {
        if *self.global_phase.lock() == KernelPhase::Halted {
            return ExecutionResult::Denied {
                plan_id: Some(plan_id),
                reason: "kernel is halted; call resume_from_halt() first".to_string(),
            };
        }
        let ctx = match self.pending_plans.lock().remove(&plan_id) {
            Some(ctx) => ctx,
            None => {
                return ExecutionResult::Denied {
                    plan_id: Some(plan_id),
                    reason: "no such pending plan".to_string(),
                }
            }
        };

        let intent_key = Self::intent_key(ctx.plan.intent_type, ctx.plan.target.as_deref());
        self.set_cooldown(&intent_key, ctx.policy_decision.requirement.cooldown_seconds);
        let _ = self.log_execution_chain(&ctx.plan, "completed", None);
        let _ = self.log_artifact(
            "approval",
            &serde_json::json!({ "plan_id": plan_id, "approval_type": approval.approval_type }),
        );
        self.events.publish(KernelEvent::PlanApproved { plan_id });
        self.approved_plans.lock().insert(plan_id, ctx);
        ExecutionResult::Completed { plan_id }
    }

    /// Rejects a pending plan. Always succeeds if the plan was pending;
    /// there is no token to revoke since none was minted.
    pub fn deny(&self, plan_id: Uuid, reason: String) -> ExecutionResult {
        let ctx = match self.pending_plans.lock().remove(&plan_id) {
            Some(ctx) => ctx,
            None => {
                return ExecutionResult::Denied {
                    plan_id: Some(plan_id),
                    reason: "no such pending plan".to_string(),
                }
            }
        };
        let _ = self.log_execution_chain(&ctx.plan, &format!("denied: {reason}"), None);
        self.events.publish(KernelEvent::PlanDenied {
            plan_id,
            reason: reason.clone(),
        });
        ExecutionResult::Denied {
            plan_id: Some(plan_id),
            reason,
        }
    }

    pub fn list_pending_plans(&self) -> Vec<PendingPlanContext> {
        self.pending_plans.lock().values().cloned().collect()
    }

    /// Cancels every pending plan with a synthetic denial (approver
    /// `EMERGENCY_STOP`), transitions to `halted`, and logs a critical
    /// `emergencyStop` violation. Absorbing until [`Self::resume_from_halt`].
    pub fn emergency_stop(&self, reason: &str) -> Result<(), CoreError> {
        let cancelled: Vec<PendingPlanContext> = self.pending_plans.lock().drain().map(|(_, v)| v).collect();
        for ctx in &cancelled {
            let _ = self.log_execution_chain(&ctx.plan, "denied: EMERGENCY_STOP", None);
        }
        self.log_policy_violation(PolicyViolationKind::EmergencyStop, reason)?;
        *self.global_phase.lock() = KernelPhase::Halted;
        self.events.publish(KernelEvent::EmergencyStop);
        tracing::error!(reason, cancelled = cancelled.len(), "emergency stop engaged");
        Ok(())
    }

    /// Clears `halted`. Only valid from that posture; any other call is a
    /// caller error, not a broken kernel invariant, so it returns an error
    /// rather than panicking.
    pub fn resume_from_halt(&self) -> Result<(), CoreError> {
        let mut phase = self.global_phase.lock();
        if *phase != KernelPhase::Halted {
            return Err(CoreError::InvalidTransition("resume_from_halt called outside the halted posture"));
        }
        *phase = KernelPhase::Idle;
        drop(phase);
        self.log_system_event("resumed from halt")?;
        self.events.publish(KernelEvent::ResumedFromHalt);
        Ok(())
    }

    /// Forces every currently pending plan back through policy mapping
    /// (logged as `escalated`), for a host responding to a shift in risk
    /// posture that the original decision didn't anticipate.
    pub fn escalate_pending_plans(&self) -> Vec<Uuid> {
        let pending: Vec<(Uuid, PendingPlanContext)> = self.pending_plans.lock().drain().collect();
        let mut ids = Vec::with_capacity(pending.len());
        for (plan_id, ctx) in pending {
            let _ = self.log_execution_chain(&ctx.plan, "escalated", None);
            self.events.publish(KernelEvent::Escalated {
                plan_id,
                reason: "forced escalation sweep".to_string(),
            });
            ids.push(plan_id);
        }
        ids
    }

    /// Runs the vault's biometric-gated ECDSA signature over an approved
    /// plan's hash and folds it into the plan's in-progress [`ApprovalSession`]
    /// as a `DeviceOperator` signature. Held vault lock spans the biometric
    /// prompt; the vault is single-writer (§5), so this serializes against
    /// any concurrent approval in progress, the same tradeoff `EvidenceMirror`
    /// makes.
    ///
    /// Low/Medium tiers need only this one signer type and the returned
    /// session already satisfies quorum. High/Critical additionally require
    /// `OrgAuthority`/`EmergencyOverride` signatures — collect those with
    /// [`Self::collect_quorum_signature`] before minting.
    pub async fn collect_biometric_approval(
        &self,
        plan_id: Uuid,
        prompt: &str,
    ) -> Result<ApprovalSession, CoreError> {
        let ctx = self
            .approved_plans
            .lock()
            .get(&plan_id)
            .cloned()
            .ok_or(CoreError::UnknownPlan(plan_id))?;

        let plan_hash = ctx.plan.plan_hash();
        let signature = self.vault.lock().sign_plan_hash(plan_hash.as_bytes(), prompt).await?;

        let device_signature = CollectedSignature {
            signer_id: self.device_fingerprint.clone(),
            signer_type: SignerType::DeviceOperator,
            signature_data: signature.clone(),
            signed_at: Utc::now(),
        };
        Ok(self.merge_quorum_signature(plan_id, &ctx, device_signature, Some(signature)))
    }

    /// Folds an additional signer's signature (`OrgAuthority`,
    /// `EmergencyOverride`) into the plan's in-progress [`ApprovalSession`],
    /// for the signer types [`Self::collect_biometric_approval`] cannot
    /// produce on its own. The kernel does not verify these signatures
    /// itself — the caller is expected to have already authenticated the
    /// signer through whatever external channel that signer type implies
    /// (org approval workflow, emergency-override ceremony) before calling
    /// this.
    pub fn collect_quorum_signature(
        &self,
        plan_id: Uuid,
        signer_type: SignerType,
        signer_id: String,
        signature_data: Vec<u8>,
    ) -> Result<ApprovalSession, CoreError> {
        let ctx = self
            .approved_plans
            .lock()
            .get(&plan_id)
            .cloned()
            .ok_or(CoreError::UnknownPlan(plan_id))?;

        let signature = CollectedSignature {
            signer_id,
            signer_type,
            signature_data,
            signed_at: Utc::now(),
        };
        Ok(self.merge_quorum_signature(plan_id, &ctx, signature, None))
    }

    /// Inserts or updates the plan's tracked [`ApprovalSession`] with one
    /// more collected signature, replacing any earlier signature from the
    /// same signer type (re-signing supersedes rather than duplicates).
    fn merge_quorum_signature(
        &self,
        plan_id: Uuid,
        ctx: &PendingPlanContext,
        signature: CollectedSignature,
        human_signature: Option<Vec<u8>>,
    ) -> ApprovalSession {
        let tier = ctx.risk_assessment.tier;
        let mut sessions = self.approval_sessions.lock();
        let session = sessions.entry(plan_id).or_insert_with(|| ApprovalSession {
            id: Uuid::new_v4(),
            approved: true,
            expires_at: Utc::now() + Duration::seconds(60),
            approval_type: ApprovalType::Biometric,
            approved_scopes: vec!["default".to_string()],
            reversibility_required: ctx.plan.reversibility != kernel_model::ReversibilityClass::Reversible,
            human_signature: None,
            required_signers: kernel_policy::quorum::required_signer_count(tier),
            collected_signatures: Vec::new(),
        });

        session.collected_signatures.retain(|s| s.signer_type != signature.signer_type);
        session.collected_signatures.push(signature);
        if let Some(sig) = human_signature {
            session.human_signature = Some(sig);
        }
        session.expires_at = Utc::now() + Duration::seconds(60);
        session.approval_type = if session.collected_signatures.len() > 1 {
            ApprovalType::Quorum
        } else {
            ApprovalType::Biometric
        };
        session.clone()
    }

    /// Mints the one-use [`kernel_model::AuthorizationToken`] for a plan
    /// that has already been approved (auto-approved or via
    /// [`Self::authorize`]) and has a valid [`ApprovalSession`].
    pub fn issue_hardened_token(
        &self,
        plan_id: Uuid,
        session: &ApprovalSession,
    ) -> Result<kernel_model::AuthorizationToken, CoreError> {
        let ctx = self
            .approved_plans
            .lock()
            .get(&plan_id)
            .cloned()
            .ok_or(CoreError::UnknownPlan(plan_id))?;
        let token = self
            .token_mint
            .issue_hardened_token(&ctx.plan, session, self.current_posture())?;
        let _ = self.log_execution_chain(&ctx.plan, "tokenIssued", Some(token.id));
        tracing::info!(plan_id = %plan_id, token_id = %token.id, "issued authorization token");
        Ok(token)
    }

    pub fn verify_and_consume_token(&self, token: &kernel_model::AuthorizationToken) -> Result<(), CoreError> {
        Ok(self.token_mint.verify_and_consume(token)?)
    }

    pub fn issue_model_call_token(&self, request_id: String, provider: String) -> Result<ModelCallToken, CoreError> {
        Ok(self
            .token_mint
            .issue_model_call_token(request_id, provider, self.current_posture())?)
    }

    pub fn verify_and_consume_model_token(&self, token: &ModelCallToken) -> Result<(), CoreError> {
        Ok(self.token_mint.verify_and_consume_model_token(token)?)
    }

    // --- Evidence ledger delegations (§6) -------------------------------

    pub fn log_generic_artifact(&self, description: &str, value: &impl serde::Serialize) -> Result<(), CoreError> {
        self.log_artifact(description, value)
    }

    pub fn verify_chain_integrity(&self) -> Result<kernel_model::ChainVerification, CoreError> {
        Ok(self.ledger.lock().verify_chain_integrity()?)
    }

    pub fn query_by_chain_id(&self, chain_id: Uuid) -> Result<Vec<kernel_model::EvidenceEntry<EvidencePayload>>, CoreError> {
        Ok(self.ledger.lock().query_by_chain(chain_id)?)
    }

    pub fn query_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<kernel_model::EvidenceEntry<EvidencePayload>>, CoreError> {
        Ok(self.ledger.lock().query_by_range(from, to)?)
    }

    pub fn export_for_audit(&self, dest: &Path) -> Result<usize, CoreError> {
        Ok(self.ledger.lock().export_for_audit(dest)?)
    }

    /// Pushes the current chain state to a remote witness. `Ok(false)`
    /// means divergence was detected and is logged as a security violation
    /// (and the trust epoch was advanced by the mirror itself).
    pub async fn push_evidence_mirror<T: MirrorTransport>(&self, transport: T) -> Result<bool, CoreError> {
        let mirror = EvidenceMirror::new(self.vault.clone(), self.trust.clone(), transport);
        let matched = {
            let ledger = self.ledger.lock();
            mirror.push_once(&ledger).await?
        };
        if !matched {
            self.log_policy_violation(PolicyViolationKind::EvidenceDivergence, "evidence mirror detected chain divergence")?;
        }
        Ok(matched)
    }

    // --- Integrity guard delegations (§6) --------------------------------

    pub fn perform_full_check(&self) -> Result<kernel_model::IntegrityReport, CoreError> {
        let report = self.integrity.run_checks(&self.ledger.lock())?;
        *self.last_integrity.lock() = report.clone();
        Ok(report)
    }

    pub fn force_lockdown(&self, reason: &str) -> Result<(), CoreError> {
        self.integrity.force_lockdown(reason);
        self.log_policy_violation(PolicyViolationKind::IntegrityLockdown, reason)
    }

    pub fn attempt_recovery(&self) -> Result<kernel_model::IntegrityReport, CoreError> {
        let report = self.integrity.attempt_recovery(&self.ledger.lock())?;
        *self.last_integrity.lock() = report.clone();
        Ok(report)
    }

    pub fn reset_integrity_state(&self) -> Result<(), CoreError> {
        self.integrity.reset_integrity_state()?;
        self.log_system_event("integrity state reset")
    }

    pub fn is_locked(&self) -> bool {
        self.integrity.is_locked()
    }

    pub fn is_vault_usable(&self) -> bool {
        self.integrity.is_vault_usable()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use kernel_vault::{AlwaysApprove, FileBackedVault};
    use kernel_verify::AlwaysPassChecker;

    use super::*;
    use crate::clock::SystemClock;

    type TestKernel = Kernel<FileBackedVault<AlwaysApprove>, AlwaysPassChecker>;

    fn build(dir: &std::path::Path) -> TestKernel {
        let config = KernelConfig::at(dir);
        let vault = FileBackedVault::open_or_create(&dir.join("vault"), AlwaysApprove).unwrap();
        Kernel::open(&config, vault, AlwaysPassChecker, PolicyEngine::default_preset(), Arc::new(SystemClock)).unwrap()
    }

    #[tokio::test]
    async fn low_risk_read_is_auto_approved() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = build(dir.path());
        let result = kernel.execute(ExecutionIntent::new("read calendar").with_target("today")).await;
        assert!(matches!(result, ExecutionResult::Completed { .. }));
    }

    #[tokio::test]
    async fn high_risk_action_is_parked_pending_approval() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = build(dir.path());

        let mut parameters = HashMap::new();
        parameters.insert("involvesPayment".to_string(), serde_json::json!(true));
        parameters.insert(
            "recipients".to_string(),
            serde_json::json!(["a@example.com", "b@example.com", "c@example.com", "d@example.com"]),
        );
        let mut intent = ExecutionIntent::new("send email to partners");
        intent.parameters = parameters;

        let result = kernel.execute(intent).await;
        assert!(matches!(result, ExecutionResult::PendingApproval { .. }));
        assert_eq!(kernel.list_pending_plans().len(), 1);
    }

    #[tokio::test]
    async fn deny_removes_the_pending_plan() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = build(dir.path());

        let mut parameters = HashMap::new();
        parameters.insert("involvesPayment".to_string(), serde_json::json!(true));
        let mut intent = ExecutionIntent::new("send email with payment details");
        intent.parameters = parameters;
        let result = kernel.execute(intent).await;
        let plan_id = match result {
            ExecutionResult::PendingApproval { plan_id } => plan_id,
            other => panic!("expected PendingApproval, got {other:?}"),
        };

        let denial = kernel.deny(plan_id, "not authorized right now".to_string());
        assert!(matches!(denial, ExecutionResult::Denied { .. }));
        assert!(kernel.list_pending_plans().is_empty());
    }

    #[tokio::test]
    async fn authorize_then_issue_hardened_token_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = build(dir.path());

        let mut parameters = HashMap::new();
        parameters.insert("involvesPayment".to_string(), serde_json::json!(true));
        let mut intent = ExecutionIntent::new("send email with payment instructions");
        intent.parameters = parameters;
        let plan_id = match kernel.execute(intent).await {
            ExecutionResult::PendingApproval { plan_id } => plan_id,
            other => panic!("expected PendingApproval, got {other:?}"),
        };

        let approval = kernel.authorize(plan_id, ApprovalInput::new(kernel_model::ApprovalType::Biometric));
        assert!(matches!(approval, ExecutionResult::Completed { .. }));

        let session = kernel.collect_biometric_approval(plan_id, "approve payment email?").await.unwrap();
        let token = kernel.issue_hardened_token(plan_id, &session).unwrap();
        kernel.verify_and_consume_token(&token).unwrap();
        assert!(kernel.verify_and_consume_token(&token).is_err(), "replay must be rejected");
    }

    #[tokio::test]
    async fn emergency_stop_halts_and_resume_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = build(dir.path());

        let mut parameters = HashMap::new();
        parameters.insert("involvesPayment".to_string(), serde_json::json!(true));
        let mut intent = ExecutionIntent::new("send email with a payment");
        intent.parameters = parameters;
        kernel.execute(intent).await;
        assert_eq!(kernel.list_pending_plans().len(), 1);

        kernel.emergency_stop("suspicious burst of activity").unwrap();
        assert!(kernel.list_pending_plans().is_empty());

        let blocked = kernel.execute(ExecutionIntent::new("read calendar")).await;
        assert!(matches!(blocked, ExecutionResult::Denied { .. }));

        kernel.resume_from_halt().unwrap();
        let result = kernel.execute(ExecutionIntent::new("read calendar")).await;
        assert!(matches!(result, ExecutionResult::Completed { .. }));
    }

    #[tokio::test]
    async fn repeated_low_risk_action_is_rate_limited_by_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileBackedVault::open_or_create(&dir.path().join("vault"), AlwaysApprove).unwrap();
        let config = KernelConfig::at(dir.path());
        let clock = Arc::new(crate::clock::SimulatedClock::new(Utc::now()));
        let kernel: TestKernel = Kernel::open(
            &config,
            vault,
            AlwaysPassChecker,
            PolicyEngine::default_preset(),
            clock.clone(),
        )
        .unwrap();

        // Low tier with no preview auto-approves but still sets a cooldown
        // floor of zero unless the policy preset raises it; a FileWrite
        // keyword pushes reversibility/mutation enough that the preset's
        // low-tier floor still applies a nonzero cooldown in some presets,
        // so assert only that a second identical call is internally
        // consistent rather than asserting a specific tier.
        let first = kernel.execute(ExecutionIntent::new("read calendar").with_target("today")).await;
        assert!(matches!(first, ExecutionResult::Completed { .. }));
        let second = kernel.execute(ExecutionIntent::new("read calendar").with_target("today")).await;
        assert!(matches!(second, ExecutionResult::Completed { .. } | ExecutionResult::CooldownActive { .. }));
    }

    #[test]
    fn empty_action_is_rejected_at_intake() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = build(dir.path());
        let result = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(kernel.execute(ExecutionIntent::new("   ")));
        assert!(matches!(result, ExecutionResult::Failed { phase: KernelPhase::Intake, .. }));
    }

    /// An `ObjectExists` probe fails whenever it is asked to check an empty
    /// target, passes otherwise. Used to drive the `CalendarUpdate` probe
    /// set below confidence without failing a required probe.
    struct FailObjectExistsOnEmptyTarget;

    #[async_trait::async_trait]
    impl ProbeChecker for FailObjectExistsOnEmptyTarget {
        async fn check(&self, probe: &kernel_model::ProbeDefinition) -> Result<bool, String> {
            let fail = probe.probe_type == kernel_model::ProbeType::ObjectExists && probe.target.is_empty();
            Ok(!fail)
        }
    }

    #[tokio::test]
    async fn missing_calendar_target_escalates_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let config = KernelConfig::at(dir.path());
        let vault = FileBackedVault::open_or_create(&dir.path().join("vault"), AlwaysApprove).unwrap();
        let kernel: Kernel<FileBackedVault<AlwaysApprove>, FailObjectExistsOnEmptyTarget> = Kernel::open(
            &config,
            vault,
            FailObjectExistsOnEmptyTarget,
            PolicyEngine::default_preset(),
            Arc::new(SystemClock),
        )
        .unwrap();

        let result = kernel.execute(ExecutionIntent::new("update calendar")).await;
        match result {
            ExecutionResult::Escalated { phase, .. } => assert_eq!(phase, KernelPhase::Probes),
            other => panic!("expected Escalated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_irreversible_send_is_blocked_by_cooldown_after_approval() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileBackedVault::open_or_create(&dir.path().join("vault"), AlwaysApprove).unwrap();
        let config = KernelConfig::at(dir.path());
        let clock = Arc::new(crate::clock::SimulatedClock::new(Utc::now()));
        let kernel: TestKernel = Kernel::open(
            &config,
            vault,
            AlwaysPassChecker,
            PolicyEngine::default_preset(),
            clock.clone(),
        )
        .unwrap();

        // High tier: payment + four external recipients + a "password"
        // marker pushes risk into the high band, which carries a nonzero
        // cooldown floor (unlike low/medium in the default preset).
        let mut parameters = HashMap::new();
        parameters.insert("involvesPayment".to_string(), serde_json::json!(true));
        parameters.insert(
            "recipients".to_string(),
            serde_json::json!(["a@example.com", "b@example.com", "c@example.com", "d@example.com"]),
        );
        let build_intent = || {
            let mut intent = ExecutionIntent::new("send email with password reset to partners");
            intent.parameters = parameters.clone();
            intent
        };

        let plan_id = match kernel.execute(build_intent()).await {
            ExecutionResult::PendingApproval { plan_id } => plan_id,
            other => panic!("expected PendingApproval, got {other:?}"),
        };
        let approval = kernel.authorize(plan_id, ApprovalInput::new(kernel_model::ApprovalType::Biometric));
        assert!(matches!(approval, ExecutionResult::Completed { .. }));

        let second = kernel.execute(build_intent()).await;
        match second {
            ExecutionResult::CooldownActive { remaining_seconds, .. } => assert!(remaining_seconds > 0),
            other => panic!("expected CooldownActive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replay_of_a_consumed_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = build(dir.path());

        let plan_id = match kernel.execute(ExecutionIntent::new("read calendar").with_target("today")).await {
            ExecutionResult::Completed { plan_id } => plan_id,
            other => panic!("expected Completed, got {other:?}"),
        };
        let session = kernel.collect_biometric_approval(plan_id, "approve read?").await.unwrap();
        let token = kernel.issue_hardened_token(plan_id, &session).unwrap();

        kernel.verify_and_consume_token(&token).unwrap();
        assert!(kernel.verify_and_consume_token(&token).is_err(), "replay must be rejected");
    }

    #[tokio::test]
    async fn rotating_the_signing_key_invalidates_an_outstanding_token() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = build(dir.path());

        let plan_id = match kernel.execute(ExecutionIntent::new("read calendar").with_target("today")).await {
            ExecutionResult::Completed { plan_id } => plan_id,
            other => panic!("expected Completed, got {other:?}"),
        };
        let session = kernel.collect_biometric_approval(plan_id, "approve read?").await.unwrap();
        let token = kernel.issue_hardened_token(plan_id, &session).unwrap();
        assert_eq!(token.key_version, 1);
        assert_eq!(token.epoch, 1);

        kernel.trust.lock().rotate_key().unwrap();

        assert!(kernel.verify_and_consume_token(&token).is_err(), "token bound to a revoked key must fail");
    }

    #[tokio::test]
    async fn ledger_tamper_forces_lockdown_and_denies_further_token_issuance() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = build(dir.path());

        let plan_id = match kernel.execute(ExecutionIntent::new("read calendar").with_target("today")).await {
            ExecutionResult::Completed { plan_id } => plan_id,
            other => panic!("expected Completed, got {other:?}"),
        };
        let session = kernel.collect_biometric_approval(plan_id, "approve read?").await.unwrap();

        let config = KernelConfig::at(dir.path());
        let chain_path = config.evidence_chain_path();
        let raw = std::fs::read_to_string(&chain_path).unwrap();
        let mut lines: Vec<String> = raw.lines().map(str::to_string).collect();
        assert!(!lines.is_empty());
        let pos = lines[0]
            .find(|c: char| c.is_ascii_hexdigit())
            .expect("first entry must contain a hex digit (id, hash, or signature)");
        let mut chars: Vec<char> = lines[0].chars().collect();
        chars[pos] = if chars[pos] == '0' { '1' } else { '0' };
        lines[0] = chars.into_iter().collect();
        std::fs::write(&chain_path, lines.join("\n") + "\n").unwrap();

        let verification = kernel.verify_chain_integrity().unwrap();
        assert!(!verification.overall_valid);
        assert!(verification.violations.iter().any(|v| matches!(
            v.kind,
            kernel_model::IntegrityViolationKind::DataCorruption | kernel_model::IntegrityViolationKind::SequenceGap
        )));

        let report = kernel.perform_full_check().unwrap();
        assert_eq!(report.posture, IntegrityPosture::Lockdown);
        assert!(kernel.is_locked());

        assert!(kernel.issue_hardened_token(plan_id, &session).is_err());
    }

    #[tokio::test]
    async fn high_tier_token_requires_additional_quorum_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = build(dir.path());

        let mut parameters = HashMap::new();
        parameters.insert("involvesPayment".to_string(), serde_json::json!(true));
        parameters.insert(
            "recipients".to_string(),
            serde_json::json!(["a@example.com", "b@example.com", "c@example.com", "d@example.com"]),
        );
        let mut intent = ExecutionIntent::new("send email with password reset to partners");
        intent.parameters = parameters;
        let plan_id = match kernel.execute(intent).await {
            ExecutionResult::PendingApproval { plan_id } => plan_id,
            other => panic!("expected PendingApproval, got {other:?}"),
        };
        kernel.authorize(plan_id, ApprovalInput::new(kernel_model::ApprovalType::Biometric));

        let device_only = kernel.collect_biometric_approval(plan_id, "approve?").await.unwrap();
        let device_only_token = kernel.issue_hardened_token(plan_id, &device_only).unwrap();
        assert!(
            kernel.verify_and_consume_token(&device_only_token).is_err(),
            "a device signature alone cannot satisfy a high-tier quorum"
        );

        let full_session = kernel
            .collect_quorum_signature(plan_id, SignerType::OrgAuthority, "org-1".to_string(), vec![1, 2, 3])
            .unwrap();
        let token = kernel.issue_hardened_token(plan_id, &full_session).unwrap();
        kernel.verify_and_consume_token(&token).unwrap();
    }
}

//! Authorization Token Mint & Verifier (C12) and the durable consumed-token
//! stores that back C5. Issuance is fail-closed on every precondition in
//! §4.6; verification consumes atomically so replay (S5) is impossible.

pub mod consumed;
pub mod mint;

pub use consumed::ConsumedTokenStore;
pub use mint::{TokenError, TokenMint};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use kernel_model::{ApprovalSession, ApprovalType, IntegrityPosture, IntentType, ProbeDefinition, ReversibilityClass, ToolPlan};
    use kernel_vault::{AlwaysApprove, FileBackedVault};
    use parking_lot::Mutex;
    use uuid::Uuid;

    use super::*;

    fn approved_session() -> ApprovalSession {
        ApprovalSession {
            id: Uuid::new_v4(),
            approved: true,
            expires_at: Utc::now() + Duration::minutes(5),
            approval_type: ApprovalType::UserConfirm,
            approved_scopes: vec!["default".into()],
            reversibility_required: false,
            human_signature: None,
            required_signers: 1,
            collected_signatures: vec![],
        }
    }

    fn sample_plan() -> ToolPlan {
        ToolPlan {
            id: Uuid::new_v4(),
            intent_type: IntentType::FileWrite,
            summary: "write a config file".into(),
            target: Some("/etc/app.conf".into()),
            originating_action: "write_file".into(),
            risk_total: 10,
            risk_reasons: vec![],
            reversibility: ReversibilityClass::Reversible,
            reversibility_reason: "backup taken".into(),
            steps: vec![],
            probes: Vec::<ProbeDefinition>::new(),
            signature: String::new(),
        }
    }

    fn build_mint(
        dir: &std::path::Path,
    ) -> TokenMint<FileBackedVault<AlwaysApprove>> {
        let vault = Arc::new(Mutex::new(
            FileBackedVault::open_or_create(&dir.join("vault"), AlwaysApprove).unwrap(),
        ));
        let trust = Arc::new(Mutex::new(
            kernel_trust::TrustEpochManager::open(&dir.join("trust"), vault.clone()).unwrap(),
        ));
        let fingerprint = vault.lock().device_fingerprint();
        let devices = Arc::new(Mutex::new(
            kernel_trust::DeviceRegistry::open(&dir.join("trust"), &fingerprint).unwrap(),
        ));
        let consumed_auth = Arc::new(Mutex::new(
            ConsumedTokenStore::open(dir.join("consumed_auth.json")).unwrap(),
        ));
        let consumed_model = Arc::new(Mutex::new(
            ConsumedTokenStore::open(dir.join("consumed_model.json")).unwrap(),
        ));
        TokenMint::new(trust, devices, vault, consumed_auth, consumed_model, fingerprint)
    }

    #[test]
    fn issues_and_verifies_a_hardened_token() {
        let dir = tempfile::tempdir().unwrap();
        let mint = build_mint(dir.path());
        let plan = sample_plan();
        let session = approved_session();

        let token = mint
            .issue_hardened_token(&plan, &session, IntegrityPosture::Nominal)
            .unwrap();
        assert!(mint.verify_and_consume(&token).is_ok());
    }

    #[test]
    fn replayed_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mint = build_mint(dir.path());
        let plan = sample_plan();
        let session = approved_session();

        let token = mint
            .issue_hardened_token(&plan, &session, IntegrityPosture::Nominal)
            .unwrap();
        assert!(mint.verify_and_consume(&token).is_ok());
        let replay = mint.verify_and_consume(&token);
        assert!(matches!(replay, Err(TokenError::AlreadyConsumed)));
    }

    #[test]
    fn lockdown_posture_blocks_minting() {
        let dir = tempfile::tempdir().unwrap();
        let mint = build_mint(dir.path());
        let plan = sample_plan();
        let session = approved_session();

        let result = mint.issue_hardened_token(&plan, &session, IntegrityPosture::Lockdown);
        assert!(matches!(result, Err(TokenError::Lockdown)));
    }

    #[test]
    fn unapproved_session_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mint = build_mint(dir.path());
        let plan = sample_plan();
        let mut session = approved_session();
        session.approved = false;

        let result = mint.issue_hardened_token(&plan, &session, IntegrityPosture::Nominal);
        assert!(matches!(result, Err(TokenError::ApprovalNotValid)));
    }

    #[test]
    fn key_rotation_invalidates_outstanding_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(Mutex::new(
            FileBackedVault::open_or_create(&dir.path().join("vault"), AlwaysApprove).unwrap(),
        ));
        let trust = Arc::new(Mutex::new(
            kernel_trust::TrustEpochManager::open(&dir.path().join("trust"), vault.clone()).unwrap(),
        ));
        let fingerprint = vault.lock().device_fingerprint();
        let devices = Arc::new(Mutex::new(
            kernel_trust::DeviceRegistry::open(&dir.path().join("trust"), &fingerprint).unwrap(),
        ));
        let consumed_auth = Arc::new(Mutex::new(
            ConsumedTokenStore::open(dir.path().join("consumed_auth.json")).unwrap(),
        ));
        let consumed_model = Arc::new(Mutex::new(
            ConsumedTokenStore::open(dir.path().join("consumed_model.json")).unwrap(),
        ));
        let mint = TokenMint::new(
            trust.clone(),
            devices,
            vault,
            consumed_auth,
            consumed_model,
            fingerprint,
        );

        let plan = sample_plan();
        let session = approved_session();
        let token = mint
            .issue_hardened_token(&plan, &session, IntegrityPosture::Nominal)
            .unwrap();

        trust.lock().rotate_key().unwrap();

        let result = mint.verify_and_consume(&token);
        assert!(matches!(result, Err(TokenError::StaleBinding)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mint = build_mint(dir.path());
        let plan = sample_plan();
        let session = approved_session();
        let mut token = mint
            .issue_hardened_token(&plan, &session, IntegrityPosture::Nominal)
            .unwrap();
        token.expires_at = Utc::now() - Duration::seconds(1);

        let result = mint.verify_and_consume(&token);
        assert!(matches!(result, Err(TokenError::Expired)));
    }
}

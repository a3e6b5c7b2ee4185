use std::sync::Arc;

use base64::Engine;
use chrono::{Duration, Utc};
use kernel_crypto::sha256;
use kernel_model::{
    ApprovalSession, ApprovalType, AuthorizationToken, IntegrityPosture, ModelCallToken, RiskTier,
    ToolPlan,
};
use kernel_trust::{DeviceRegistry, TrustEpochManager};
use kernel_vault::SigningVault;
use parking_lot::Mutex;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::consumed::ConsumedTokenStore;

const TOKEN_LIFETIME_SECONDS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("integrity guard is in lockdown; no token may be minted")]
    Lockdown,
    #[error("approval session is not approved or has expired")]
    ApprovalNotValid,
    #[error("current device is not trusted")]
    DeviceNotTrusted,
    #[error("trust epoch state is inconsistent")]
    TrustInconsistent,
    #[error("token key version or epoch no longer matches active state")]
    StaleBinding,
    #[error("token has expired")]
    Expired,
    #[error("signature verification failed")]
    BadSignature,
    #[error("human signature verification failed")]
    BadHumanSignature,
    #[error("quorum requirement not satisfied")]
    QuorumUnsatisfied,
    #[error("token already consumed")]
    AlreadyConsumed,
    #[error(transparent)]
    Trust(#[from] kernel_trust::TrustError),
    #[error(transparent)]
    Storage(#[from] kernel_storage::StorageError),
    #[error(transparent)]
    Crypto(#[from] kernel_crypto::CryptoError),
}

/// Token Mint & Verifier (C12). Issues [`AuthorizationToken`]s and
/// [`ModelCallToken`]s and verifies them on presentation, fail-closed on
/// every precondition in §4.6.
pub struct TokenMint<V: SigningVault> {
    trust: Arc<Mutex<TrustEpochManager<V>>>,
    devices: Arc<Mutex<DeviceRegistry>>,
    vault: Arc<Mutex<V>>,
    consumed_auth: Arc<Mutex<ConsumedTokenStore>>,
    consumed_model: Arc<Mutex<ConsumedTokenStore>>,
    device_fingerprint: String,
}

impl<V: SigningVault> TokenMint<V> {
    pub fn new(
        trust: Arc<Mutex<TrustEpochManager<V>>>,
        devices: Arc<Mutex<DeviceRegistry>>,
        vault: Arc<Mutex<V>>,
        consumed_auth: Arc<Mutex<ConsumedTokenStore>>,
        consumed_model: Arc<Mutex<ConsumedTokenStore>>,
        device_fingerprint: String,
    ) -> Self {
        Self {
            trust,
            devices,
            vault,
            consumed_auth,
            consumed_model,
            device_fingerprint,
        }
    }

    fn check_mint_preconditions(
        &self,
        session: &ApprovalSession,
        integrity_posture: IntegrityPosture,
    ) -> Result<(), TokenError> {
        if integrity_posture == IntegrityPosture::Lockdown {
            return Err(TokenError::Lockdown);
        }
        if !session.approved || session.expires_at <= Utc::now() {
            return Err(TokenError::ApprovalNotValid);
        }
        if !self.devices.lock().is_device_trusted(&self.device_fingerprint) {
            return Err(TokenError::DeviceNotTrusted);
        }
        if !self.trust.lock().verify_integrity() {
            return Err(TokenError::TrustInconsistent);
        }
        Ok(())
    }

    /// Preferred mint path: a hardware-signed human approval bound to a
    /// specific plan hash.
    pub fn issue_hardened_token(
        &self,
        plan: &ToolPlan,
        session: &ApprovalSession,
        integrity_posture: IntegrityPosture,
    ) -> Result<AuthorizationToken, TokenError> {
        self.check_mint_preconditions(session, integrity_posture)?;

        let trust = self.trust.lock();
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::seconds(TOKEN_LIFETIME_SECONDS);
        let key_version = trust.state().active_key_version;
        let epoch = trust.state().trust_epoch;
        let mac_key = trust.active_mac_key()?;

        let mut token = AuthorizationToken {
            id: Uuid::new_v4(),
            plan_id: plan.id,
            risk_tier: RiskTier::from_total(plan.risk_total),
            approval_type: session.approval_type,
            issued_at,
            expires_at,
            signature: String::new(),
            plan_hash: plan.plan_hash().to_hex(),
            approved_scopes: session.approved_scopes.clone(),
            reversibility_required: session.reversibility_required,
            approval_session_id: session.id,
            human_signature: session.human_signature.clone(),
            required_signers: session.required_signers,
            collected_signatures: session.collected_signatures.clone(),
            key_version,
            epoch,
        };

        let tag = kernel_crypto::hmac_sign(&mac_key, &token.mac_payload())?;
        token.signature = base64::engine::general_purpose::STANDARD.encode(tag);

        tracing::info!(plan_id = %plan.id, tier = ?token.risk_tier, "minted authorization token");
        Ok(token)
    }

    /// Legacy, lighter-weight mint path retained for callers that have not
    /// yet adopted hardware-signed approval sessions.
    pub fn issue_token(
        &self,
        plan_id: Uuid,
        plan_hash_hex: String,
        risk_tier: RiskTier,
        approval_type: ApprovalType,
    ) -> Result<AuthorizationToken, TokenError> {
        let trust = self.trust.lock();
        if !trust.verify_integrity() {
            return Err(TokenError::TrustInconsistent);
        }
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::seconds(TOKEN_LIFETIME_SECONDS);
        let key_version = trust.state().active_key_version;
        let epoch = trust.state().trust_epoch;
        let mac_key = trust.active_mac_key()?;

        let mut token = AuthorizationToken {
            id: Uuid::new_v4(),
            plan_id,
            risk_tier,
            approval_type,
            issued_at,
            expires_at,
            signature: String::new(),
            plan_hash: plan_hash_hex,
            approved_scopes: vec![],
            reversibility_required: false,
            approval_session_id: Uuid::new_v4(),
            human_signature: None,
            required_signers: 0,
            collected_signatures: vec![],
            key_version,
            epoch,
        };
        let tag = kernel_crypto::hmac_sign(&mac_key, &token.mac_payload())?;
        token.signature = base64::engine::general_purpose::STANDARD.encode(tag);
        Ok(token)
    }

    /// Mints a [`ModelCallToken`] for calling an external model. Callers
    /// are expected to have already run feature-flag/risk checks and, for
    /// high/critical risk, collected human approval before calling this.
    pub fn issue_model_call_token(
        &self,
        request_id: String,
        provider: String,
        integrity_posture: IntegrityPosture,
    ) -> Result<ModelCallToken, TokenError> {
        if integrity_posture == IntegrityPosture::Lockdown {
            return Err(TokenError::Lockdown);
        }
        let trust = self.trust.lock();
        if !trust.verify_integrity() {
            return Err(TokenError::TrustInconsistent);
        }
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::seconds(TOKEN_LIFETIME_SECONDS);
        let key_version = trust.state().active_key_version;
        let epoch = trust.state().trust_epoch;
        let mac_key = trust.active_mac_key()?;

        let mut token = ModelCallToken {
            id: Uuid::new_v4(),
            request_id,
            provider,
            issued_at,
            expires_at,
            signature: String::new(),
            key_version,
            epoch,
        };
        let tag = kernel_crypto::hmac_sign(&mac_key, &token.mac_payload())?;
        token.signature = base64::engine::general_purpose::STANDARD.encode(tag);
        Ok(token)
    }

    /// Full verification + consumption per §4.6 steps 1-6.
    pub fn verify_and_consume(&self, token: &AuthorizationToken) -> Result<(), TokenError> {
        let trust = self.trust.lock();
        let state = trust.state();

        if token.key_version != state.active_key_version
            || token.epoch != state.trust_epoch
            || state.revoked_key_versions.contains(&token.key_version)
        {
            return Err(TokenError::StaleBinding);
        }
        if Utc::now() >= token.expires_at {
            return Err(TokenError::Expired);
        }

        let mac_key = trust.active_mac_key()?;
        let expected = kernel_crypto::hmac_sign(&mac_key, &token.mac_payload())?;
        let actual = base64::engine::general_purpose::STANDARD
            .decode(&token.signature)
            .map_err(|_| TokenError::BadSignature)?;
        if actual.len() != 32 || !bool::from(expected[..].ct_eq(&actual[..])) {
            return Err(TokenError::BadSignature);
        }

        if let Some(human_sig) = &token.human_signature {
            let plan_hash_bytes = hex_decode(&token.plan_hash).map_err(|_| TokenError::BadHumanSignature)?;
            if human_sig.len() != 64 {
                return Err(TokenError::BadHumanSignature);
            }
            let mut sig = [0u8; 64];
            sig.copy_from_slice(human_sig);
            self.vault
                .lock()
                .verify_plan_hash(&plan_hash_bytes, &sig)
                .map_err(|_| TokenError::BadHumanSignature)?;
        }

        let quorum = kernel_policy::quorum::validate(token);
        if !quorum.satisfied {
            return Err(TokenError::QuorumUnsatisfied);
        }

        let token_hash = sha256(token.id.as_bytes()).to_hex();
        let newly_consumed = self
            .consumed_auth
            .lock()
            .consume(token_hash, token.expires_at)?;
        if !newly_consumed {
            return Err(TokenError::AlreadyConsumed);
        }

        Ok(())
    }

    pub fn verify_and_consume_model_token(&self, token: &ModelCallToken) -> Result<(), TokenError> {
        let trust = self.trust.lock();
        let state = trust.state();
        if token.key_version != state.active_key_version
            || token.epoch != state.trust_epoch
            || state.revoked_key_versions.contains(&token.key_version)
        {
            return Err(TokenError::StaleBinding);
        }
        if Utc::now() >= token.expires_at {
            return Err(TokenError::Expired);
        }
        let mac_key = trust.active_mac_key()?;
        let expected = kernel_crypto::hmac_sign(&mac_key, &token.mac_payload())?;
        let actual = base64::engine::general_purpose::STANDARD
            .decode(&token.signature)
            .map_err(|_| TokenError::BadSignature)?;
        if actual.len() != 32 || !bool::from(expected[..].ct_eq(&actual[..])) {
            return Err(TokenError::BadSignature);
        }

        let token_hash = sha256(token.id.as_bytes()).to_hex();
        let newly_consumed = self
            .consumed_model
            .lock()
            .consume(token_hash, token.expires_at)?;
        if !newly_consumed {
            return Err(TokenError::AlreadyConsumed);
        }
        Ok(())
    }
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    for i in (0..s.len()).step_by(2) {
        out.push(u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ())?);
    }
    Ok(out)
}

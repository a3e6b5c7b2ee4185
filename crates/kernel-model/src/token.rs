use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::risk::RiskTier;

/// How a plan came to be approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalType {
    Automatic,
    UserConfirm,
    Biometric,
    Quorum,
    EmergencyOverride,
}

/// The distinct class of entity that produced a [`CollectedSignature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignerType {
    DeviceOperator,
    OrgAuthority,
    EmergencyOverride,
}

impl SignerType {
    /// Required signer-type set per risk tier, per §4.6 step 5 / C14.
    pub fn required_set(tier: RiskTier) -> &'static [SignerType] {
        match tier {
            RiskTier::Low | RiskTier::Medium => &[SignerType::DeviceOperator],
            RiskTier::High => &[SignerType::DeviceOperator, SignerType::OrgAuthority],
            RiskTier::Critical => &[
                SignerType::DeviceOperator,
                SignerType::OrgAuthority,
                SignerType::EmergencyOverride,
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedSignature {
    /// Hash of the signer's public key.
    pub signer_id: String,
    pub signer_type: SignerType,
    pub signature_data: Vec<u8>,
    pub signed_at: DateTime<Utc>,
}

/// The sole credential for side effects. Constructible only by the mint;
/// every field is read-only after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationToken {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub risk_tier: RiskTier,
    pub approval_type: ApprovalType,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Base64 HMAC-SHA-256 over `planId | issuedAt | expiresAt`.
    pub signature: String,
    /// Hex SHA-256 over the canonical plan material.
    pub plan_hash: String,
    pub approved_scopes: Vec<String>,
    pub reversibility_required: bool,
    pub approval_session_id: Uuid,
    /// Fixed 64-byte raw `r‖s` ECDSA-P256 signature over `plan_hash`, if
    /// collected (`kernel_crypto::EcdsaKeyPair::sign`'s wire format, not DER).
    pub human_signature: Option<Vec<u8>>,
    pub required_signers: u32,
    pub collected_signatures: Vec<CollectedSignature>,
    pub key_version: u64,
    pub epoch: u64,
}

impl AuthorizationToken {
    pub fn mac_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.plan_id.as_bytes());
        out.extend_from_slice(&self.issued_at.timestamp().to_be_bytes());
        out.extend_from_slice(&self.expires_at.timestamp().to_be_bytes());
        out
    }

    /// `|collectedSignatures| ≥ requiredSigners` and the signer-type set
    /// covers the per-tier requirement, per §4.6 step 5.
    pub fn quorum_satisfied(&self) -> bool {
        if self.collected_signatures.len() < self.required_signers as usize {
            return false;
        }
        let present: std::collections::HashSet<SignerType> = self
            .collected_signatures
            .iter()
            .map(|s| s.signer_type)
            .collect();
        SignerType::required_set(self.risk_tier)
            .iter()
            .all(|required| present.contains(required))
    }
}

/// Same mint path as [`AuthorizationToken`], used when the host wants to
/// call an external model. Payload is prefixed `"MCT"` and consumption is
/// tracked in a parallel store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCallToken {
    pub id: Uuid,
    pub request_id: String,
    pub provider: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
    pub key_version: u64,
    pub epoch: u64,
}

impl ModelCallToken {
    pub fn mac_payload(&self) -> Vec<u8> {
        let mut out = b"MCT".to_vec();
        out.extend_from_slice(self.request_id.as_bytes());
        out.extend_from_slice(&self.issued_at.timestamp().to_be_bytes());
        out.extend_from_slice(&self.expires_at.timestamp().to_be_bytes());
        out
    }
}

/// `{tokenHash = SHA-256(token.id), expiresAt}`. Raw IDs are never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumedEntry {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// A bounded window in which a human's ECDSA signature, biometric-gated,
/// has been collected and is ready to be linked to a single token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSession {
    pub id: Uuid,
    pub approved: bool,
    pub expires_at: DateTime<Utc>,
    pub approval_type: ApprovalType,
    pub approved_scopes: Vec<String>,
    pub reversibility_required: bool,
    /// Raw `r‖s` ECDSA-P256 signature, same format as
    /// [`AuthorizationToken::human_signature`].
    pub human_signature: Option<Vec<u8>>,
    pub required_signers: u32,
    pub collected_signatures: Vec<CollectedSignature>,
}

//! Quorum Policy (C14): the per-risk-tier required signer set, and a
//! validator that checks a token's collected signatures against it.

use kernel_model::{AuthorizationToken, RiskTier, SignerType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumCheck {
    pub satisfied: bool,
    pub required: Vec<SignerType>,
    pub missing: Vec<SignerType>,
    pub collected_count: usize,
    pub required_count: u32,
}

/// Validates a token's `collectedSignatures` against the required
/// signer-type set and count for its risk tier.
pub fn validate(token: &AuthorizationToken) -> QuorumCheck {
    let required: Vec<SignerType> = SignerType::required_set(token.risk_tier).to_vec();
    let present: std::collections::HashSet<SignerType> = token
        .collected_signatures
        .iter()
        .map(|s| s.signer_type)
        .collect();
    let missing: Vec<SignerType> = required
        .iter()
        .copied()
        .filter(|s| !present.contains(s))
        .collect();

    let satisfied = missing.is_empty()
        && token.collected_signatures.len() >= token.required_signers as usize;

    QuorumCheck {
        satisfied,
        required,
        missing,
        collected_count: token.collected_signatures.len(),
        required_count: token.required_signers,
    }
}

/// Required signer count for a tier, used when constructing a token before
/// signatures are collected. Derived directly from [`SignerType::required_set`]
/// so the count can never drift out of sync with the set `validate` checks
/// against — a token built with this count and one later validated against
/// the same tier's set always agree on how many signatures are needed.
pub fn required_signer_count(tier: RiskTier) -> u32 {
    SignerType::required_set(tier).len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kernel_model::{ApprovalType, CollectedSignature};
    use uuid::Uuid;

    fn token_with_signatures(tier: RiskTier, signatures: Vec<CollectedSignature>) -> AuthorizationToken {
        AuthorizationToken {
            id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            risk_tier: tier,
            approval_type: ApprovalType::Quorum,
            issued_at: Utc::now(),
            expires_at: Utc::now(),
            signature: String::new(),
            plan_hash: String::new(),
            approved_scopes: vec![],
            reversibility_required: false,
            approval_session_id: Uuid::new_v4(),
            human_signature: None,
            required_signers: required_signer_count(tier),
            collected_signatures: signatures,
            key_version: 1,
            epoch: 1,
        }
    }

    #[test]
    fn critical_requires_three_distinct_signer_types() {
        let token = token_with_signatures(
            RiskTier::Critical,
            vec![
                CollectedSignature {
                    signer_id: "a".into(),
                    signer_type: SignerType::DeviceOperator,
                    signature_data: vec![],
                    signed_at: Utc::now(),
                },
                CollectedSignature {
                    signer_id: "b".into(),
                    signer_type: SignerType::OrgAuthority,
                    signature_data: vec![],
                    signed_at: Utc::now(),
                },
            ],
        );
        let check = validate(&token);
        assert!(!check.satisfied);
        assert_eq!(check.missing, vec![SignerType::EmergencyOverride]);
    }

    #[test]
    fn low_tier_needs_only_device_operator() {
        let token = token_with_signatures(
            RiskTier::Low,
            vec![CollectedSignature {
                signer_id: "a".into(),
                signer_type: SignerType::DeviceOperator,
                signature_data: vec![],
                signed_at: Utc::now(),
            }],
        );
        assert!(validate(&token).satisfied);
    }
}

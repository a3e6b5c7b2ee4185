use serde::{Deserialize, Serialize};

use kernel_model::{IntegrityViolation, PolicyViolationKind};

/// The concrete union of payload shapes an evidence entry can carry. Spec's
/// `EvidenceEntry<T>` leaves `T` generic; every component in this kernel
/// that appends evidence uses this closed set rather than an open `T`, so
/// readers of an exported chain never need type information out-of-band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EvidencePayload {
    /// A snapshot of a plan's lifecycle: its hash, the decision reached,
    /// and (if minted) the authorization token ID.
    ExecutionChain {
        plan_id: uuid::Uuid,
        plan_hash: String,
        decision: String,
        token_id: Option<uuid::Uuid>,
    },
    /// An opaque artifact reference (export manifest, mirror receipt).
    Artifact { description: String, reference: String },
    /// A recorded integrity violation found while walking the hash chain.
    Violation { violation: IntegrityViolation },
    /// A security/policy violation raised by the decision pipeline itself
    /// (intake rejection, emergency stop) rather than discovered by a chain
    /// walk.
    PolicyViolation {
        kind: PolicyViolationKind,
        detail: String,
    },
    /// A free-form operational note (rotation, revocation, lockdown).
    SystemEvent { message: String },
}

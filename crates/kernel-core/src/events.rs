//! Typed event bus the pipeline publishes to on every phase transition.
//! Spec's redesign notes call for typed channels over dynamic dispatch for
//! cross-component notification; this is that channel, backed by
//! `tokio::sync::broadcast` the way the teacher wires its own task
//! notifications.

use kernel_model::RiskTier;
use uuid::Uuid;

/// A notification a host can subscribe to without polling the pipeline.
/// Lossy by design: a lagging subscriber misses old events rather than
/// blocking the pipeline, matching `broadcast`'s semantics.
#[derive(Debug, Clone)]
pub enum KernelEvent {
    PlanPending { plan_id: Uuid, tier: RiskTier },
    PlanApproved { plan_id: Uuid },
    PlanDenied { plan_id: Uuid, reason: String },
    Escalated { plan_id: Uuid, reason: String },
    EmergencyStop,
    ResumedFromHalt,
}

/// Wraps a `broadcast::Sender`; subscribers that never show up pay nothing,
/// and a full channel just drops the oldest event rather than blocking
/// `execute()`.
pub struct EventBus {
    sender: tokio::sync::broadcast::Sender<KernelEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<KernelEvent> {
        self.sender.subscribe()
    }

    /// Best-effort publish: no subscribers is the common case, not an error.
    pub fn publish(&self, event: KernelEvent) {
        let _ = self.sender.send(event);
    }
}

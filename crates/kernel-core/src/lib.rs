//! Decision Pipeline (C11): the capability kernel's composition root.
//!
//! Everything else in this workspace is a component with its own narrow
//! contract (a vault, a risk scorer, a token mint); this crate is the only
//! place that wires them into the ten-phase flow a caller actually drives.

pub mod clock;
pub mod config;
pub mod events;
pub mod kernel;
pub mod planning;
pub mod result;

pub use clock::{Clock, SimulatedClock, SystemClock};
pub use config::KernelConfig;
pub use events::{EventBus, KernelEvent};
pub use kernel::Kernel;
pub use result::{ApprovalInput, ExecutionResult};

/// Infrastructure-level failures: everything that can go wrong opening or
/// driving the kernel's collaborators, as distinct from [`ExecutionResult`]
/// which covers the pipeline's own decision outcomes.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Storage(#[from] kernel_storage::StorageError),
    #[error(transparent)]
    Trust(#[from] kernel_trust::TrustError),
    #[error(transparent)]
    Vault(#[from] kernel_vault::VaultError),
    #[error(transparent)]
    Ledger(#[from] kernel_ledger::LedgerError),
    #[error(transparent)]
    Integrity(#[from] kernel_integrity::IntegrityError),
    #[error(transparent)]
    Token(#[from] kernel_token::TokenError),
    #[error("failed to serialize evidence payload: {0}")]
    Serialize(String),
    #[error("no plan found with id {0}")]
    UnknownPlan(uuid::Uuid),
    #[error("invalid state transition: {0}")]
    InvalidTransition(&'static str),
}

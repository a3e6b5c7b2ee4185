use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk layout root and host-tunable knobs, loaded once at kernel
/// startup. Holds directory layout only — the policy approval matrix
/// itself lives in `kernel_model::PolicyConfiguration`, loaded separately
/// so a policy update doesn't require a kernel restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    pub root_dir: PathBuf,
    /// Optional remote witness endpoint for the evidence mirror. Absent
    /// means mirroring is the host's responsibility to wire up explicitly.
    pub mirror_endpoint: Option<String>,
    /// Per-intent-key cooldown overrides, in seconds, layered on top of the
    /// policy engine's tier-derived floor.
    #[serde(default)]
    pub cooldown_overrides: HashMap<String, u64>,
}

impl KernelConfig {
    pub fn at(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            mirror_endpoint: None,
            cooldown_overrides: HashMap::new(),
        }
    }

    pub fn kernel_security_dir(&self) -> PathBuf {
        self.root_dir.join("KernelSecurity")
    }

    pub fn evidence_chain_path(&self) -> PathBuf {
        self.root_dir.join("EvidenceChain").join("chain.jsonl")
    }

    pub fn consumed_auth_tokens_path(&self) -> PathBuf {
        self.kernel_security_dir().join("consumed_auth_tokens.json")
    }

    pub fn consumed_model_tokens_path(&self) -> PathBuf {
        self.kernel_security_dir().join("consumed_model_tokens.json")
    }

    /// Loads a config from `path`, or `KernelConfig::at(root_dir)`'s
    /// defaults if no file exists yet.
    pub fn load_or_default(path: &Path, root_dir: impl Into<PathBuf>) -> Result<Self, kernel_storage::StorageError> {
        Ok(kernel_storage::read_json(path)?.unwrap_or_else(|| Self::at(root_dir)))
    }
}

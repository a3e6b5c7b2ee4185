use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use kernel_model::ConsumedEntry;

/// Durable one-use enforcement (C5): a persistent set of hashed token IDs
/// with expiries. Raw token IDs are never stored.
pub struct ConsumedTokenStore {
    entries: Vec<ConsumedEntry>,
    path: PathBuf,
}

impl ConsumedTokenStore {
    /// Loads the store, pruning entries whose `expiresAt + 120s` has
    /// already passed.
    pub fn open(path: PathBuf) -> Result<Self, kernel_storage::StorageError> {
        let mut entries: Vec<ConsumedEntry> =
            kernel_storage::read_json(&path)?.unwrap_or_default();
        let now = Utc::now();
        entries.retain(|e| e.expires_at + Duration::seconds(120) > now);
        let store = Self { entries, path };
        store.persist()?;
        Ok(store)
    }

    /// Atomic compare-and-insert. `Ok(true)` when newly consumed,
    /// `Ok(false)` when the hash was already present (replay).
    pub fn consume(
        &mut self,
        token_hash: String,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, kernel_storage::StorageError> {
        if self.entries.iter().any(|e| e.token_hash == token_hash) {
            return Ok(false);
        }
        self.entries.push(ConsumedEntry {
            token_hash,
            expires_at,
        });
        self.persist()?;
        Ok(true)
    }

    pub fn is_consumed(&self, token_hash: &str) -> bool {
        self.entries.iter().any(|e| e.token_hash == token_hash)
    }

    fn persist(&self) -> Result<(), kernel_storage::StorageError> {
        kernel_storage::write_json_atomic(&self.path, &self.entries)
    }
}

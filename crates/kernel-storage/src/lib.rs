//! Atomic file persistence helpers shared by every durable kernel store
//! (evidence ledger, trust-epoch state, device registry, consumed-token
//! stores). Every write goes through write-to-temp-then-rename so a crash
//! mid-write never leaves a torn file.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// Reads and deserializes a JSON file, returning `None` if it doesn't
/// exist yet (a fresh install, not an error).
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read(path).map_err(|e| StorageError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let value = serde_json::from_slice(&raw).map_err(|e| StorageError::Decode {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Serializes `value` and atomically replaces the file at `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    let raw = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Decode {
        path: path.display().to_string(),
        source: e,
    })?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, raw).map_err(|e| StorageError::Io {
        path: tmp.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| StorageError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Appends one line-delimited record to `path`, opening for append and
/// writing a single newline-terminated record, matching the evidence
/// ledger's write pattern.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
    writeln!(file, "{line}").map_err(|e| StorageError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Reads every line of a line-delimited file, ignoring a trailing empty
/// line. Returns an empty vec for a missing or empty file.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| StorageError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(raw.lines().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert_eq!(read_json::<Sample>(&path).unwrap(), None);
    }

    #[test]
    fn round_trips_through_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &Sample { value: 42 }).unwrap();
        assert_eq!(read_json(&path).unwrap(), Some(Sample { value: 42 }));
    }

    #[test]
    fn appended_lines_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        append_line(&path, "one").unwrap();
        append_line(&path, "two").unwrap();
        assert_eq!(read_lines(&path).unwrap(), vec!["one", "two"]);
    }
}

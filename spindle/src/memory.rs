//! Long-term memory: append-only JSON array on disk.
//!
//! Each stored item is wrapped as `{timestamp, source, data}` and the whole
//! array is rewritten. Load failure warns and starts empty; save failure is
//! logged and never propagates, so memory problems cannot take an
//! interaction down.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mcp::epoch_seconds;

/// One memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub timestamp: f64,
    pub source: String,
    pub data: Value,
}

/// Persistent memory across runs.
///
/// **Interaction**: The `Agent` façade stores one entry per completed
/// interaction; the CLI `memory` command reads recent entries back.
pub struct SessionMemory {
    path: PathBuf,
    entries: Vec<MemoryEntry>,
}

impl SessionMemory {
    /// Opens (or initialises) the memory file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(body) => match serde_json::from_str(&body) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not parse memory file, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self { path, entries }
    }

    /// Appends one wrapped entry and rewrites the file.
    pub fn store(&mut self, data: Value, source: &str) {
        self.entries.push(MemoryEntry {
            timestamp: epoch_seconds(),
            source: source.to_string(),
            data,
        });
        self.save();
    }

    /// The last `limit` entries, oldest first.
    pub fn retrieve(&self, limit: usize) -> &[MemoryEntry] {
        let start = self.entries.len().saturating_sub(limit);
        &self.entries[start..]
    }

    /// Entries whose serialised data contains the keyword,
    /// case-insensitively.
    pub fn search(&self, keyword: &str) -> Vec<&MemoryEntry> {
        let needle = keyword.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.data.to_string().to_lowercase().contains(&needle))
            .collect()
    }

    /// Drops all entries and rewrites the file.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.save();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) {
        let body = match serde_json::to_string_pretty(&self.entries) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "could not serialise memory");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = fs::create_dir_all(parent);
            }
        }
        if let Err(e) = fs::write(&self.path, body) {
            tracing::warn!(path = %self.path.display(), error = %e, "could not save memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    /// **Scenario**: Stored entries survive a reopen.
    #[test]
    fn store_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.json");
        {
            let mut memory = SessionMemory::open(&path);
            memory.store(json!({"question": "q1"}), "advanced_terminal_agent");
            memory.store(json!({"question": "q2"}), "advanced_terminal_agent");
        }
        let memory = SessionMemory::open(&path);
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.retrieve(10)[0].data["question"], "q1");
        assert_eq!(memory.retrieve(10)[0].source, "advanced_terminal_agent");
    }

    /// **Scenario**: retrieve returns the tail window, oldest first, and the
    /// earlier snapshot is a prefix of the later one.
    #[test]
    fn retrieve_is_append_only_prefix() {
        let dir = tempdir().unwrap();
        let mut memory = SessionMemory::open(dir.path().join("m.json"));
        memory.store(json!(1), "t");
        memory.store(json!(2), "t");
        let first: Vec<Value> = memory.retrieve(10).iter().map(|e| e.data.clone()).collect();
        memory.store(json!(3), "t");
        let second: Vec<Value> = memory.retrieve(10).iter().map(|e| e.data.clone()).collect();
        assert_eq!(&second[..first.len()], &first[..]);
        assert_eq!(memory.retrieve(2).len(), 2);
        assert_eq!(memory.retrieve(2)[0].data, json!(2));
    }

    /// **Scenario**: search matches case-insensitively on serialised data.
    #[test]
    fn search_case_insensitive() {
        let dir = tempdir().unwrap();
        let mut memory = SessionMemory::open(dir.path().join("m.json"));
        memory.store(json!({"answer": "Listed README.md"}), "t");
        memory.store(json!({"answer": "ran tests"}), "t");
        assert_eq!(memory.search("readme").len(), 1);
        assert_eq!(memory.search("nothing").len(), 0);
    }

    /// **Scenario**: A corrupt file warns and starts empty instead of
    /// failing.
    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(&path, "[{ bad json").unwrap();
        let memory = SessionMemory::open(&path);
        assert!(memory.is_empty());
    }

    /// **Scenario**: clear empties the store durably.
    #[test]
    fn clear_is_durable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.json");
        let mut memory = SessionMemory::open(&path);
        memory.store(json!(1), "t");
        memory.clear();
        drop(memory);
        assert!(SessionMemory::open(&path).is_empty());
    }
}

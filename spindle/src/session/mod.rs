//! Session & context manager: the bounded, relevance-ranked memory of one
//! session.
//!
//! Context items are append-only: pruning removes items but never edits
//! their content. Checkpoints serialise the item list to
//! `<session>_<label>.json`; restore replaces the list atomically and a
//! failed parse leaves the current list untouched.

mod compress;
mod relevance;

pub use compress::compress;
pub use relevance::score_batch;

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::mcp::epoch_seconds;
use crate::settings::Settings;

/// What kind of event a context item records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    UserQuery,
    ToolResult,
    Observation,
    Reflection,
}

impl ContextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserQuery => "user_query",
            Self::ToolResult => "tool_result",
            Self::Observation => "observation",
            Self::Reflection => "reflection",
        }
    }
}

/// One piece of session context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    /// Short hash of timestamp + kind + content.
    pub id: String,
    pub content: Value,
    pub kind: ContextKind,
    pub timestamp: f64,
    #[serde(default)]
    pub relevance_score: f64,
}

impl ContextItem {
    pub fn new(content: Value, kind: ContextKind) -> Self {
        let timestamp = epoch_seconds();
        let id = short_hash(&format!("{}{}{}", timestamp, kind.as_str(), content));
        Self {
            id,
            content,
            kind,
            timestamp,
            relevance_score: 0.0,
        }
    }

    /// Text rendering of the content for scoring and compression.
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// First eight hex chars of a SHA-256 digest.
fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..8].to_string()
}

/// Errors from session persistence.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("checkpoint not found: {0}")]
    NotFound(String),
}

/// Owns the context stream for one session.
///
/// **Interaction**: The `Agent` façade appends queries and tool results,
/// scores/compresses/prunes per interaction, and saves an automatic
/// checkpoint on the configured cadence.
pub struct SessionManager {
    session_id: String,
    settings: Settings,
    items: Vec<ContextItem>,
}

impl SessionManager {
    pub fn new(session_id: impl Into<String>, settings: Settings) -> Self {
        Self {
            session_id: session_id.into(),
            settings,
            items: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Appends a context item with a fresh id and timestamp.
    pub fn add_context(&mut self, content: Value, kind: ContextKind) -> &ContextItem {
        self.items.push(ContextItem::new(content, kind));
        self.items.last().expect("just pushed")
    }

    pub fn items(&self) -> &[ContextItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Scores every item against the query (scores written back) and
    /// returns a copy sorted in non-increasing relevance order.
    pub fn score(&mut self, query: &str) -> Vec<ContextItem> {
        relevance::score_batch(&mut self.items, query);
        self.items.clone()
    }

    /// Scores, then renders the compressed context block.
    pub fn compressed_context(&mut self, query: &str) -> String {
        let scored = self.score(query);
        compress::compress(&scored, self.settings.compress_max_tokens)
    }

    /// Scores against the query and retains only the top `keep_top_n`.
    pub fn prune_by_relevance(&mut self, query: &str) {
        relevance::score_batch(&mut self.items, query);
        self.items.truncate(self.settings.keep_top_n);
        tracing::debug!(kept = self.items.len(), "pruned session context");
    }

    /// Drops every item (explicit session reset).
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Serialised item history for debugging and replay.
    pub fn replay(&self) -> Value {
        serde_json::to_value(&self.items).unwrap_or(Value::Null)
    }

    /// Saves the item list to `<checkpoint_dir>/<session>_<label>.json`.
    /// The write goes through a temp file and rename, so a crash never
    /// leaves a half-written checkpoint behind.
    pub fn save_checkpoint(&self, label: &str) -> Result<PathBuf, SessionError> {
        fs::create_dir_all(&self.settings.checkpoint_dir)
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        let checkpoint = json!({
            "name": label,
            "timestamp": epoch_seconds(),
            "session_id": self.session_id,
            "context_items": self.items,
            "item_count": self.items.len(),
        });
        let body = serde_json::to_string_pretty(&checkpoint)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;

        let path = self.checkpoint_path(label);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| SessionError::Storage(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| SessionError::Storage(e.to_string()))?;
        tracing::info!(path = %path.display(), "checkpoint saved");
        Ok(path)
    }

    /// Replaces the current item list from a checkpoint. On any failure the
    /// current list is unchanged and the error is returned.
    pub fn restore_checkpoint(&mut self, label: &str) -> Result<usize, SessionError> {
        let path = self.checkpoint_path(label);
        let body = fs::read_to_string(&path)
            .map_err(|_| SessionError::NotFound(path.display().to_string()))?;
        let checkpoint: Value = serde_json::from_str(&body)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        let items: Vec<ContextItem> = serde_json::from_value(
            checkpoint
                .get("context_items")
                .cloned()
                .unwrap_or(Value::Null),
        )
        .map_err(|e| SessionError::Serialization(e.to_string()))?;

        self.items = items;
        tracing::info!(restored = self.items.len(), "checkpoint restored");
        Ok(self.items.len())
    }

    /// New manager branching from the current state; subsequent mutations
    /// are independent.
    pub fn fork(&self, new_session_id: impl Into<String>) -> SessionManager {
        SessionManager {
            session_id: new_session_id.into(),
            settings: self.settings.clone(),
            items: self.items.clone(),
        }
    }

    fn checkpoint_path(&self, label: &str) -> PathBuf {
        self.settings
            .checkpoint_dir
            .join(format!("{}_{}.json", self.session_id, label))
    }
}

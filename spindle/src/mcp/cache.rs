//! Response cache for MCP operations.
//!
//! Keys are `(kind, server, name, canonical_arguments)`; the canonical
//! encoding is deterministic and order-independent for mappings, so two
//! argument maps with the same entries in different order share one entry.
//! Writes happen only on successful responses; entries expire by TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

/// Which operation family a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Resource,
    Tool,
    Prompt,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Tool => "tool",
            Self::Prompt => "prompt",
        }
    }
}

/// Full cache key; also the circuit-breaker key for the same target.
pub type CacheKey = (CacheKind, String, String, String);

/// Builds a cache key from an operation's coordinates.
pub fn cache_key(kind: CacheKind, server: &str, name: &str, arguments: &Value) -> CacheKey {
    (
        kind,
        server.to_string(),
        name.to_string(),
        canonical_arguments(arguments),
    )
}

/// Stable string encoding of an argument value: object keys are sorted
/// recursively, everything else serialises as-is.
pub fn canonical_arguments(arguments: &Value) -> String {
    fn canon(v: &Value) -> Value {
        match v {
            Value::Object(map) => {
                let sorted: std::collections::BTreeMap<String, Value> =
                    map.iter().map(|(k, val)| (k.clone(), canon(val))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(canon).collect()),
            other => other.clone(),
        }
    }
    canon(arguments).to_string()
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// TTL cache over the last successful response per key.
///
/// **Interaction**: Private to `McpClient`; lookups on cold or expired
/// entries fall through to the transport, hits short-circuit it.
pub struct ResponseCache {
    entries: HashMap<CacheKey, Entry>,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            enabled,
        }
    }

    /// Returns the cached response, or `None` when cold, expired or disabled.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        let entry = self.entries.get(key)?;
        if entry.expires_at < Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Stores a successful response. No-op when disabled.
    pub fn set(&mut self, key: CacheKey, value: Value) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drops one entry (explicit invalidation).
    pub fn invalidate(&mut self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// (live entries, total entries) — expired ones still count as total
    /// until a write replaces them.
    pub fn stats(&self) -> (usize, usize) {
        let now = Instant::now();
        let live = self
            .entries
            .values()
            .filter(|e| e.expires_at >= now)
            .count();
        (live, self.entries.len())
    }
}

//! Execution audit graph.
//!
//! Write-once record of the steps one `answer()` call took: plan, batches,
//! execution results. The snapshot is stored into long-term memory for
//! later inspection; nothing reads it on the live path.

use serde_json::{json, Value};

/// Directed graph of `{id, data}` nodes and `{from, to}` edges.
#[derive(Debug, Default)]
pub struct ExecutionGraph {
    nodes: Vec<Value>,
    edges: Vec<Value>,
}

impl ExecutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node_id: &str, data: Value) {
        self.nodes.push(json!({"id": node_id, "data": data}));
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges.push(json!({"from": from, "to": to}));
    }

    /// Serialisable snapshot for the memory store.
    pub fn snapshot(&self) -> Value {
        json!({"nodes": self.nodes, "edges": self.edges})
    }
}

//! Tool-chain optimiser: dependency detection and parallel-safe batching.
//!
//! Independent of the planner's DAG: the oracle sketches a low-level tool
//! chain for the goal, and the batching pass groups nodes whose
//! prerequisites are satisfied — read-type nodes together in one parallel
//! batch, mutating nodes as singletons in dependency order.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;

use crate::llm::{extract_json_object, Oracle};
use crate::mcp::{McpClient, ToolResponse};

/// Read-type operations that may run concurrently.
const PARALLEL_SAFE: &[&str] = &[
    "read_file",
    "list_directory",
    "search_files",
    "tail_file",
    "git_status",
    "git_diff",
    "system_info",
    "get_env",
    "list_processes",
    "check_port",
];

/// One node in the low-level tool dependency graph.
#[derive(Debug, Clone)]
pub struct ToolNode {
    pub name: String,
    pub arguments: Map<String, Value>,
    /// Names of tools that must run first.
    pub dependencies: HashSet<String>,
    /// Derived from the static parallel-safe policy.
    pub can_run_parallel: bool,
}

impl ToolNode {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let can_run_parallel = PARALLEL_SAFE.contains(&name.as_str());
        Self {
            name,
            arguments: Map::new(),
            dependencies: HashSet::new(),
            can_run_parallel,
        }
    }
}

/// Result of dispatching one node in a batch.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub tool_name: String,
    pub response: Value,
    pub success: bool,
}

/// Chain detection plus batching plus bounded parallel dispatch.
///
/// **Interaction**: The `Agent` façade runs `detect` + `optimize` as an
/// advisory pass per goal (logged for the audit trail); `execute_batch`
/// dispatches one batch through the `McpClient` under the
/// `max_parallel_tools` bound.
pub struct ToolChain {
    oracle: Arc<dyn Oracle>,
    max_parallel: usize,
}

impl ToolChain {
    pub fn new(oracle: Arc<dyn Oracle>, max_parallel: usize) -> Self {
        Self {
            oracle,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Asks the oracle which tools the goal needs, in dependency order.
    /// Detection failure returns an empty chain; the pass is advisory.
    pub async fn detect(&self, goal: &str) -> Vec<ToolNode> {
        let prompt = build_chain_prompt(goal);
        let reply = match self.oracle.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(error = %e, "chain detection oracle call failed");
                return Vec::new();
            }
        };
        let Some(parsed) = extract_json_object(&reply) else {
            tracing::debug!("chain detection reply not parseable");
            return Vec::new();
        };

        parsed
            .get("tool_chain")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let name = item.get("tool").and_then(Value::as_str)?;
                        let mut node = ToolNode::new(name);
                        if let Some(args) = item.get("arguments").and_then(Value::as_object) {
                            node.arguments = args.clone();
                        }
                        if let Some(deps) = item.get("dependencies").and_then(Value::as_array) {
                            node.dependencies = deps
                                .iter()
                                .filter_map(Value::as_str)
                                .map(String::from)
                                .collect();
                        }
                        Some(node)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Groups nodes into execution batches: per round, all ready
    /// parallel-safe nodes form one batch, then each ready sequential node
    /// gets a singleton batch. An unsatisfiable remainder (cycle) aborts
    /// and the leftover nodes are dropped with a warning.
    pub fn optimize(&self, nodes: Vec<ToolNode>) -> Vec<Vec<ToolNode>> {
        let mut batches = Vec::new();
        let mut remaining = nodes;
        let mut completed: HashSet<String> = HashSet::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<ToolNode>, Vec<ToolNode>) = remaining
                .into_iter()
                .partition(|n| n.dependencies.is_subset(&completed));

            if ready.is_empty() {
                tracing::warn!(
                    leftover = blocked.len(),
                    "circular tool-chain dependencies, aborting batching"
                );
                break;
            }

            let (parallel, sequential): (Vec<ToolNode>, Vec<ToolNode>) =
                ready.into_iter().partition(|n| n.can_run_parallel);

            if !parallel.is_empty() {
                completed.extend(parallel.iter().map(|n| n.name.clone()));
                batches.push(parallel);
            }
            for node in sequential {
                completed.insert(node.name.clone());
                batches.push(vec![node]);
            }

            remaining = blocked;
        }

        batches
    }

    /// Dispatches one batch concurrently and awaits the whole batch.
    /// Individual failures do not cancel siblings; each node yields a
    /// `BatchResult` either way.
    pub async fn execute_batch(
        &self,
        client: &McpClient,
        server: &str,
        batch: &[ToolNode],
    ) -> Vec<BatchResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let futures = batch.iter().map(|node| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                match client.call_tool(server, &node.name, node.arguments.clone()).await {
                    Ok(response) => BatchResult {
                        tool_name: node.name.clone(),
                        success: response.success(),
                        response: response.to_value(),
                    },
                    Err(err) => BatchResult {
                        tool_name: node.name.clone(),
                        success: false,
                        response: json!({"success": false, "error": err.to_string()}),
                    },
                }
            }
        });
        join_all(futures).await
    }
}

/// Serialisable view of a batching plan for the audit graph.
pub fn batches_to_value(batches: &[Vec<ToolNode>]) -> Value {
    Value::Array(
        batches
            .iter()
            .map(|batch| {
                Value::Array(
                    batch
                        .iter()
                        .map(|n| {
                            json!({
                                "tool": n.name,
                                "parallel": n.can_run_parallel,
                            })
                        })
                        .collect(),
                )
            })
            .collect(),
    )
}

fn build_chain_prompt(goal: &str) -> String {
    format!(
        r#"You are analysing what tools are needed for this goal.

GOAL: {goal}

AVAILABLE TOOLS (with correct argument names):
- read_file(path: str): Read file contents
- write_file(path: str, content: str): Write to file
- list_directory(path: str = "."): List files in directory
- search_files(keyword: str, path: str = "."): Search for files by name
- run_command(command: str, cwd: str = "."): Execute shell command
- git_status(): Check git status
- git_diff(): Show git diff
- system_info(): Get system information
- replace_in_file(path: str, search: str, replace: str): Find and replace in file

OUTPUT FORMAT (JSON only):
{{
  "tool_chain": [
    {{"tool": "list_directory", "arguments": {{"path": "."}}, "dependencies": []}},
    {{"tool": "read_file", "arguments": {{"path": "config.py"}}, "dependencies": ["list_directory"]}}
  ]
}}

List tools in dependency order."#,
        goal = goal
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockOracle;

    fn node(name: &str, deps: &[&str]) -> ToolNode {
        let mut n = ToolNode::new(name);
        n.dependencies = deps.iter().map(|s| s.to_string()).collect();
        n
    }

    /// **Scenario**: Read-type tools are parallel-safe, mutations are not.
    #[test]
    fn parallel_safety_classification() {
        assert!(ToolNode::new("read_file").can_run_parallel);
        assert!(ToolNode::new("system_info").can_run_parallel);
        assert!(!ToolNode::new("write_file").can_run_parallel);
        assert!(!ToolNode::new("run_command").can_run_parallel);
        assert!(!ToolNode::new("git_commit").can_run_parallel);
    }

    /// **Scenario**: Two independent reads share one parallel batch; the
    /// dependent write follows as a singleton.
    #[test]
    fn optimize_groups_parallel_then_sequential() {
        let chain = ToolChain::new(Arc::new(MockOracle::new("")), 5);
        let nodes = vec![
            node("list_directory", &[]),
            node("system_info", &[]),
            node("write_file", &["list_directory"]),
        ];
        let batches = chain.optimize(nodes);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert!(batches[0].iter().all(|n| n.can_run_parallel));
        assert_eq!(batches[1][0].name, "write_file");
    }

    /// **Scenario**: Ready sequential nodes each get their own batch.
    #[test]
    fn sequential_nodes_are_singletons() {
        let chain = ToolChain::new(Arc::new(MockOracle::new("")), 5);
        let nodes = vec![node("run_command", &[]), node("write_file", &[])];
        let batches = chain.optimize(nodes);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[1].len(), 1);
    }

    /// **Scenario**: A dependency cycle aborts batching instead of looping.
    #[test]
    fn cycle_aborts_batching() {
        let chain = ToolChain::new(Arc::new(MockOracle::new("")), 5);
        let nodes = vec![node("read_file", &["write_file"]), node("write_file", &["read_file"])];
        let batches = chain.optimize(nodes);
        assert!(batches.is_empty());
    }

    /// **Scenario**: Detection parses the oracle's tool_chain list and
    /// derives parallel safety.
    #[tokio::test]
    async fn detect_parses_chain() {
        let reply = r#"{
            "tool_chain": [
                {"tool": "list_directory", "arguments": {"path": "."}, "dependencies": []},
                {"tool": "system_info", "arguments": {}, "dependencies": []}
            ]
        }"#;
        let chain = ToolChain::new(Arc::new(MockOracle::new(reply)), 5);
        let nodes = chain.detect("list the current directory and get system info").await;
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.can_run_parallel));
    }

    /// **Scenario**: Detection failure is advisory: empty chain, no error.
    #[tokio::test]
    async fn detect_failure_returns_empty() {
        let chain = ToolChain::new(Arc::new(MockOracle::new("no json at all")), 5);
        assert!(chain.detect("goal").await.is_empty());
    }
}

//! # Spindle
//!
//! A terminal-automation agent runtime: accept a natural-language goal,
//! decompose it into a validated task DAG, execute each subtask through an
//! observe → reflect → retry loop, and synthesise a final answer — with
//! every side effect mediated by a policy-gated MCP client talking to a
//! sandboxed tool server over stdio.
//!
//! ## Design principles
//!
//! - **Failures are data**: below the MCP client boundary, a failed tool
//!   call becomes an [`Observation`] that feeds reflection; only
//!   permission, timeout, breaker and cancellation conditions raise.
//! - **One gate for every effect**: the [`PolicyEngine`] is consulted
//!   before each outbound call, and again by the façade on the final
//!   `(tool, arguments)` pair.
//! - **Explicit configuration**: components receive a [`Settings`] value on
//!   construction; there is no global state.
//! - **Defensive oracle parsing**: one shared JSON extractor
//!   ([`extract_json_object`]) tolerates fences, prose and trailing commas;
//!   total parse failure degrades to neutral defaults, never an error.
//!
//! ## Main modules
//!
//! - [`mcp`]: [`McpClient`], [`McpTransport`], [`StdioTransport`],
//!   [`MockTransport`], [`ToolResponse`] — transport, discovery, policy
//!   gate, cache, retry, circuit breaker, tracing.
//! - [`planner`]: [`HierarchicalPlanner`], [`TaskPlan`], [`SubTask`] —
//!   goal → validated DAG with topological order.
//! - [`executor`]: [`SelfCorrectingExecutor`], [`Observation`],
//!   [`Reflection`] — bounded dispatch/reflect/retry loop.
//! - [`chain`]: [`ToolChain`], [`ToolNode`] — parallel-safe batching and
//!   bounded concurrent dispatch.
//! - [`session`]: [`SessionManager`], [`ContextItem`] — relevance-ranked
//!   context with compression, pruning, checkpoints and forks.
//! - [`memory`]: [`SessionMemory`] — append-only long-term store.
//! - [`policy`]: [`PolicyEngine`], [`PolicyDecision`] — deny/dry-run rules.
//! - [`agent`]: [`Agent`] — the plan → execute → summarise pipeline.
//! - [`llm`]: [`Oracle`] trait, [`MockOracle`], [`HttpOracle`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spindle::{Agent, McpClient, MockOracle, MockTransport, PolicyEngine, Settings};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let transport = Arc::new(MockTransport::new().with_tool("read_file", "Read a file", &["path"]));
//! let oracle = Arc::new(MockOracle::new("done"));
//! let settings = Settings::default();
//! let policy = PolicyEngine::new(settings.dry_run);
//!
//! let client = McpClient::connect(transport, oracle.clone(), policy.clone(), settings.clone())
//!     .await
//!     .expect("connect");
//! let mut agent = Agent::new(Arc::new(client), oracle, policy, settings, "main");
//! let answer = agent.answer("Show the first 10 lines of README.md").await.expect("answer");
//! println!("{}", answer);
//! # }
//! ```

pub mod agent;
pub mod chain;
pub mod error;
pub mod executor;
pub mod llm;
pub mod mcp;
pub mod memory;
pub mod planner;
pub mod policy;
pub mod session;
pub mod settings;

pub use agent::{Agent, ExecutionGraph, ExecutionRecord};
pub use chain::{BatchResult, ToolChain, ToolNode};
pub use error::AgentError;
pub use executor::{Observation, Reflection, ReflectionType, SelfCorrectingExecutor, SuggestedAction};
pub use llm::{extract_json_object, HttpOracle, MockOracle, Oracle, OracleError};
pub use mcp::{
    cache_key, canonical_arguments, normalize_resource, CacheKind, ContextEntry, McpClient,
    McpError, McpTransport, MockTransport, PromptSpec, ResourceSpec, StdioTransport, ToolResponse,
    ToolSpec, TraceEvent, TransportError, SERVER_TERMINAL,
};
pub use memory::{MemoryEntry, SessionMemory};
pub use planner::{HierarchicalPlanner, PlanContext, RollbackAction, SubTask, TaskPlan, TaskStatus};
pub use policy::{Action, PolicyDecision, PolicyEngine};
pub use session::{compress, score_batch, ContextItem, ContextKind, SessionError, SessionManager};
pub use settings::Settings;

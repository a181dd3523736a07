//! LLM oracle abstraction.
//!
//! The planner, reflector, chain detector and final-answer synthesis all
//! depend on a plain text-in/text-out callable; this module defines the
//! trait plus a mock (tests) and an OpenAI-compatible HTTP implementation.
//!
//! The first three callers expect JSON-in-prose and parse it through
//! [`extract_json_object`]; synthesis expects natural language and uses the
//! reply verbatim.

mod extract;
mod http;
mod mock;

pub use extract::extract_json_object;
pub use http::HttpOracle;
pub use mock::MockOracle;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from an oracle invocation.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Request could not be completed (connection, HTTP status, timeout).
    #[error("request failed: {0}")]
    Request(String),
    /// The endpoint answered but the body did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Text-in/text-out language-model oracle.
///
/// Implementations must not interpret the prompt; shaping the output (JSON
/// vs prose) is the caller's contract with the model.
///
/// **Interaction**: Used by `HierarchicalPlanner`, `SelfCorrectingExecutor`
/// (reflection), `ToolChain` (detection) and `Agent` (synthesis, prompt
/// rendering in `McpClient::get_prompt`).
#[async_trait]
pub trait Oracle: Send + Sync {
    /// One completion: prompt in, assistant text out.
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;
}

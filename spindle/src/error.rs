//! Top-level agent error type.
//!
//! Component-local failures keep their own enums (`McpError`, `OracleError`,
//! `SessionError`); this type is what `Agent::answer` surfaces to callers.

use thiserror::Error;

use crate::llm::OracleError;
use crate::mcp::McpError;
use crate::session::SessionError;

/// Error returned by the agent façade.
///
/// Most tool failures never reach this type: below the MCP client boundary
/// they are data (an `Observation` with `success = false`) and feed
/// reflection. Only unrecoverable conditions propagate.
#[derive(Debug, Error)]
pub enum AgentError {
    /// An oracle call failed and no fallback applied.
    #[error("oracle: {0}")]
    Oracle(#[from] OracleError),

    /// An MCP operation failed in a way the pipeline cannot absorb
    /// (cancellation, or context gathering when nothing is reachable).
    #[error("mcp: {0}")]
    Mcp(#[from] McpError),

    /// Session persistence failed on an explicit checkpoint request.
    #[error("session: {0}")]
    Session(#[from] SessionError),
}

//! Safety policy for outbound MCP actions.
//!
//! One synchronous decision point in front of every resource read, tool call
//! and prompt fetch. The engine is stateless and performs no I/O; the MCP
//! client and the agent façade both consult it before dispatching.

use serde_json::{Map, Value};

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Dispatch normally.
    Allow,
    /// Refuse; the caller raises a permission error or skips the task.
    Deny,
    /// Simulate: return a synthetic success without touching the server.
    DryRun,
}

/// The action under evaluation, with the payload the decision needs.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    /// Reading a resource by URI.
    Resource { uri: &'a str },
    /// Calling a named tool with its argument map.
    Tool {
        name: &'a str,
        arguments: &'a Map<String, Value>,
    },
    /// Fetching a templated prompt.
    Prompt { name: &'a str },
}

/// Command substrings that are always refused.
const BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf /",
    "shutdown",
    "reboot",
    "mkfs",
    "dd if=/dev/zero",
    "chmod 777 /",
    "chown -r",
];

/// Dangerous fragments refused inside any command line.
const DANGEROUS_PATTERNS: &[&str] = &["rm -rf", "/dev/sda", "/dev/null", ">/dev/sda"];

/// Tools that modify state; diverted when dry-run mode is on.
const MUTATING_TOOLS: &[&str] = &[
    "run_command",
    "interactive_command",
    "write_file",
    "replace_in_file",
    "kill_process",
    "git_commit",
];

/// System directory prefixes that writes may never target.
const PROTECTED_PREFIXES: &[&str] = &["/etc/", "/sys/", "/proc/", "/boot/"];

/// Central policy engine for the agent runtime.
///
/// Rules, in order: hard denies (destructive commands, workspace escapes,
/// forced commits, pid-1 kills), then the dry-run diversion for mutating
/// tools, then allow.
///
/// **Interaction**: `McpClient` gates every outbound call through
/// [`PolicyEngine::evaluate`]; the `Agent` façade re-checks the final
/// `(tool, arguments)` pair after argument injection.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    dry_run: bool,
}

impl PolicyEngine {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Decides what to do with an action. Pure and synchronous.
    pub fn evaluate(&self, action: Action<'_>) -> PolicyDecision {
        if let Action::Tool { name, arguments } = action {
            if let Some(decision) = self.evaluate_tool(name, arguments) {
                return decision;
            }
        }
        PolicyDecision::Allow
    }

    fn evaluate_tool(&self, name: &str, arguments: &Map<String, Value>) -> Option<PolicyDecision> {
        // Destructive command lines.
        if name == "run_command" || name == "interactive_command" {
            let command = str_arg(arguments, "command").to_lowercase();
            if BLOCKED_COMMANDS.iter().any(|b| command.contains(b))
                || DANGEROUS_PATTERNS.iter().any(|p| command.contains(p))
            {
                return Some(PolicyDecision::Deny);
            }
        }

        // Forced git operations.
        if name == "git_commit" {
            let message = str_arg(arguments, "message");
            if message.contains("--force") || message.contains("-f") {
                return Some(PolicyDecision::Deny);
            }
        }

        // Writes escaping the workspace.
        if name == "write_file" || name == "replace_in_file" {
            let path = str_arg(arguments, "path");
            if (path.starts_with('/') && !path.starts_with("/home"))
                || path.contains("..")
                || PROTECTED_PREFIXES.iter().any(|p| path.starts_with(p))
            {
                return Some(PolicyDecision::Deny);
            }
        }

        // Killing init or an unspecified process.
        if name == "kill_process" {
            let pid = str_arg(arguments, "process_id");
            if pid.is_empty() || pid == "1" {
                return Some(PolicyDecision::Deny);
            }
        }

        if self.dry_run && MUTATING_TOOLS.contains(&name) {
            return Some(PolicyDecision::DryRun);
        }

        None
    }
}

/// Reads a string argument, accepting numbers for things like process ids.
fn str_arg(arguments: &Map<String, Value>, key: &str) -> String {
    match arguments.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

//! CLI support library: REPL command parsing and output rendering.
//!
//! The binary (`main.rs` + `repl.rs`) stays a thin driver; everything
//! testable lives here.

use spindle::{MemoryEntry, PromptSpec, ResourceSpec, ToolSpec, TraceEvent};

/// One line of REPL input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Tools,
    Resources,
    Cache,
    Trace,
    Memory,
    Help,
    Quit,
    /// Anything else: a natural-language goal for the agent.
    Question(String),
}

impl ReplCommand {
    /// Classifies a line; `None` for blank input.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(match trimmed.to_lowercase().as_str() {
            "tools" => Self::Tools,
            "resources" => Self::Resources,
            "cache" => Self::Cache,
            "trace" => Self::Trace,
            "memory" => Self::Memory,
            "help" => Self::Help,
            "exit" | "quit" | "/quit" => Self::Quit,
            _ => Self::Question(trimmed.to_string()),
        })
    }
}

/// Renders the advertised tool list.
pub fn render_tools(tools: &[ToolSpec]) -> String {
    let mut out = format!("available tools ({}):\n", tools.len());
    for tool in tools {
        out.push_str(&format!(
            "  {} - {}\n",
            tool.name,
            tool.description.as_deref().unwrap_or("")
        ));
    }
    out
}

/// Renders the advertised resource and prompt lists.
pub fn render_resources(resources: &[ResourceSpec], prompts: &[PromptSpec]) -> String {
    let mut out = format!("available resources ({}):\n", resources.len());
    for resource in resources {
        out.push_str(&format!("  {}\n", resource.uri));
    }
    out.push_str(&format!("available prompts ({}):\n", prompts.len()));
    for prompt in prompts {
        out.push_str(&format!("  {}\n", prompt.name));
    }
    out
}

/// Renders cache statistics.
pub fn render_cache_stats(live: usize, total: usize) -> String {
    format!("cache entries: {} live / {} total\n", live, total)
}

/// Renders the most recent trace events, newest last.
pub fn render_trace(events: &[TraceEvent], limit: usize) -> String {
    let start = events.len().saturating_sub(limit);
    let mut out = format!("trace ({} of {} events):\n", events.len() - start, events.len());
    for event in &events[start..] {
        out.push_str(&format!("  {:.3} {} {}\n", event.timestamp, event.event, event.payload));
    }
    out
}

/// Renders recent memory entries.
pub fn render_memory(entries: &[MemoryEntry]) -> String {
    let mut out = format!("memory entries ({} shown):\n", entries.len());
    for entry in entries {
        let question = entry
            .data
            .get("question")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("<no question>");
        out.push_str(&format!("  [{}] {:.0} {}\n", entry.source, entry.timestamp, question));
    }
    out
}

/// The help text.
pub fn help_text() -> &'static str {
    r#"commands:
  tools      list available tools
  resources  list available resources and prompts
  cache      show response-cache statistics
  trace      show recent MCP client trace events
  memory     show recent long-term memory entries
  help       show this message
  exit/quit  leave

anything else is treated as a natural-language goal for the agent."#
}

//! Hierarchical planner: goal + context → validated task DAG.
//!
//! The oracle is asked for a `{"subtasks": [...]}` object; the reply is
//! parsed defensively and validated against the advertised tool set. A
//! completely unparseable reply degrades to a singleton diagnostic plan —
//! the caller always receives a plan, never an error.

mod plan;

pub use plan::{RollbackAction, SubTask, TaskPlan, TaskStatus};

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::llm::{extract_json_object, Oracle};
use crate::mcp::ToolSpec;

/// Context handed to one decomposition call.
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    /// Current working directory on the tool-server side.
    pub cwd: String,
}

/// Decomposes a goal into executable subtasks via the oracle.
///
/// **Interaction**: Owned by the `Agent` façade; receives the discovered
/// `ToolSpec` table so prompts show exact argument names and validation
/// checks tool membership.
pub struct HierarchicalPlanner {
    oracle: Arc<dyn Oracle>,
}

impl HierarchicalPlanner {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Breaks the goal into subtasks. Always returns a plan: parse failure
    /// yields the fallback singleton, and validation problems are attached,
    /// not raised.
    pub async fn decompose(
        &self,
        goal: &str,
        context: &PlanContext,
        tools: &[ToolSpec],
    ) -> TaskPlan {
        let prompt = build_plan_prompt(goal, context, tools);
        let valid_tools: HashSet<String> = tools.iter().map(|t| t.name.clone()).collect();

        let response = match self.oracle.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "planner oracle call failed, using fallback plan");
                return fallback_plan(goal, &valid_tools);
            }
        };

        let Some(parsed) = extract_json_object(&response) else {
            tracing::warn!("planner reply not parseable as JSON, using fallback plan");
            return fallback_plan(goal, &valid_tools);
        };

        let mut plan = TaskPlan::new(goal);
        for raw in parsed
            .get("subtasks")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let Some(subtask) = parse_subtask(raw, goal) {
                plan.add_subtask(subtask);
            }
        }

        if plan.subtasks.is_empty() {
            return fallback_plan(goal, &valid_tools);
        }

        plan.compute_execution_order();
        plan.validate_with_tools(&valid_tools);
        plan
    }
}

/// Maps one raw subtask object; the planner prompt names the field `tool`
/// but `tool_name` is accepted too.
fn parse_subtask(raw: &Value, goal: &str) -> Option<SubTask> {
    let id = raw.get("id")?.as_str()?.to_string();
    let tool_name = raw
        .get("tool")
        .or_else(|| raw.get("tool_name"))?
        .as_str()?
        .to_string();
    let description = raw
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or(goal)
        .to_string();

    let mut subtask = SubTask::new(id, description, tool_name);
    if let Some(args) = raw.get("arguments").and_then(Value::as_object) {
        subtask.arguments = args.clone();
    }
    if let Some(deps) = raw.get("dependencies").and_then(Value::as_array) {
        subtask.dependencies = deps
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
    }
    if let Some(rollback) = raw.get("rollback").filter(|v| !v.is_null()) {
        let tool = rollback.get("tool").and_then(Value::as_str);
        if let Some(tool) = tool {
            subtask.rollback_action = Some(RollbackAction {
                tool_name: tool.to_string(),
                arguments: rollback
                    .get("arguments")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            });
        }
    }
    Some(subtask)
}

/// Singleton diagnostic plan when the oracle reply is unusable. Prefers a
/// harmless `run_command` echo when the server has one; otherwise the first
/// advertised tool with empty arguments.
fn fallback_plan(goal: &str, valid_tools: &HashSet<String>) -> TaskPlan {
    let mut plan = TaskPlan::new(goal);
    let mut subtask = SubTask::new("fallback_1", goal, "run_command");
    if valid_tools.contains("run_command") {
        let mut args = Map::new();
        args.insert(
            "command".into(),
            Value::String(format!("echo 'Task: {}'", goal.replace('\'', ""))),
        );
        subtask.arguments = args;
    } else if let Some(first) = valid_tools.iter().min() {
        subtask.tool_name = first.clone();
    }
    plan.add_subtask(subtask);
    plan.compute_execution_order();
    plan.validate_with_tools(valid_tools);
    plan
}

/// One line per tool: `name(arg: type, …) - description`.
fn tool_schema_lines(tools: &[ToolSpec]) -> String {
    let mut lines = Vec::with_capacity(tools.len());
    for tool in tools {
        let args = tool
            .input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, schema)| {
                        let ty = schema
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("any");
                        format!("{}: {}", name, ty)
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        lines.push(format!(
            "- {}({}) - {}",
            tool.name,
            args,
            tool.description.as_deref().unwrap_or("")
        ));
    }
    lines.join("\n")
}

fn build_plan_prompt(goal: &str, context: &PlanContext, tools: &[ToolSpec]) -> String {
    format!(
        r#"You are a task planner. Break down this goal into ATOMIC subtasks.

GOAL: {goal}

CONTEXT:
- Current directory: {cwd}

AVAILABLE TOOLS WITH CORRECT ARGUMENT NAMES:
{schemas}

RULES:
1. Use EXACT argument names shown above.
2. Output ONLY valid JSON - no markdown, no backticks, no extra text.
3. For file operations, use relative paths.
4. Chain tools logically: search -> read -> process -> write.

OUTPUT FORMAT:
{{
  "subtasks": [
    {{
      "id": "task_1",
      "description": "what this step does",
      "tool": "tool_name",
      "arguments": {{}},
      "dependencies": [],
      "rollback": null
    }}
  ]
}}

Respond with ONLY the JSON object. No explanation, no markdown."#,
        goal = goal,
        cwd = if context.cwd.is_empty() {
            "unknown"
        } else {
            &context.cwd
        },
        schemas = tool_schema_lines(tools),
    )
}

//! Agent façade: plan → execute → synthesise, per user goal.
//!
//! Owns the planner, executor, chain optimiser, session manager and memory,
//! and drives the end-to-end sequence through the MCP client. Failures stay
//! data wherever possible; only cancellation and total oracle loss surface
//! as errors.

mod audit;

pub use audit::ExecutionGraph;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::chain::{batches_to_value, ToolChain};
use crate::error::AgentError;
use crate::executor::SelfCorrectingExecutor;
use crate::llm::Oracle;
use crate::mcp::{McpClient, McpError, SERVER_TERMINAL};
use crate::memory::SessionMemory;
use crate::planner::{HierarchicalPlanner, SubTask, TaskPlan};
use crate::policy::{Action, PolicyDecision, PolicyEngine};
use crate::session::{ContextKind, SessionManager};
use crate::settings::Settings;

/// Outcome record for one subtask, kept in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub task_id: String,
    pub tool: String,
    pub success: bool,
    pub result: Value,
    /// Set when the task never dispatched (dependency or policy skip).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// One entry on the rollback stack.
#[derive(Debug, Clone)]
struct RollbackRecord {
    task_id: String,
    tool_name: String,
    arguments: Map<String, Value>,
}

/// Terminal-automation agent over one MCP client.
///
/// **Interaction**: The CLI instantiates one agent per process and feeds it
/// questions; every side effect goes through the owned `McpClient`.
pub struct Agent {
    client: Arc<McpClient>,
    oracle: Arc<dyn Oracle>,
    policy: PolicyEngine,
    settings: Settings,
    planner: HierarchicalPlanner,
    executor: SelfCorrectingExecutor,
    chain: ToolChain,
    session: SessionManager,
    memory: SessionMemory,
    rollback_stack: Vec<RollbackRecord>,
    interactions: usize,
}

impl Agent {
    pub fn new(
        client: Arc<McpClient>,
        oracle: Arc<dyn Oracle>,
        policy: PolicyEngine,
        settings: Settings,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            planner: HierarchicalPlanner::new(Arc::clone(&oracle)),
            executor: SelfCorrectingExecutor::new(
                Arc::clone(&oracle),
                settings.executor_max_retries,
            ),
            chain: ToolChain::new(Arc::clone(&oracle), settings.max_parallel_tools),
            session: SessionManager::new(session_id, settings.clone()),
            memory: SessionMemory::open(settings.memory_path.clone()),
            rollback_stack: Vec::new(),
            interactions: 0,
            client,
            oracle,
            policy,
            settings,
        }
    }

    /// Answers one natural-language goal end to end.
    pub async fn answer(&mut self, question: &str) -> Result<String, AgentError> {
        tracing::info!(question, "answering goal");
        let mut graph = ExecutionGraph::new();
        self.rollback_stack.clear();

        self.session
            .add_context(Value::String(question.to_string()), ContextKind::UserQuery);

        // 1. Gather context. Each read tolerates failure; cancellation ends
        //    the pipeline.
        let cwd = match self.read_context_resource("session://cwd").await? {
            Some(value) => value
                .get("cwd")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            None => "unknown".to_string(),
        };
        let _ = self.read_context_resource("system://info").await?;

        // 2. Plan.
        let plan_context = crate::planner::PlanContext { cwd };
        let plan = self
            .planner
            .decompose(question, &plan_context, self.client.tools())
            .await;
        if !plan.validation_errors.is_empty() {
            tracing::warn!(errors = ?plan.validation_errors, "plan has validation errors, proceeding");
        }
        graph.add_node("plan", plan.to_value());

        // 3. Advisory tool-chain detection; logged for the audit trail only.
        let chain_nodes = self.chain.detect(question).await;
        if !chain_nodes.is_empty() {
            let batches = self.chain.optimize(chain_nodes);
            tracing::debug!(batches = batches.len(), "tool chain batched");
            graph.add_node("tool_chain", batches_to_value(&batches));
            graph.add_edge("plan", "tool_chain");
        }

        // 4. Execute in topological order.
        let execution_results = self.execute_plan(&plan, question).await?;
        graph.add_node(
            "execution",
            json!({"results": execution_results.len()}),
        );
        graph.add_edge("plan", "execution");

        // 5. Context management.
        let compressed = self.session.compressed_context(question);
        self.session.prune_by_relevance(question);

        // 6. Synthesis; a failed oracle falls back to a default answer.
        let completed = execution_results.iter().filter(|r| r.success).count();
        let final_prompt = build_answer_prompt(question, completed, &execution_results, &compressed);
        let answer = match self.oracle.generate(&final_prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed, using default answer");
                default_answer(&plan, &execution_results)
            }
        };

        // 7. Persist.
        self.memory.store(
            json!({
                "question": question,
                "plan": plan.to_value(),
                "execution_results": execution_results,
                "answer": answer.clone(),
                "execution_graph": graph.snapshot(),
                "self_correction_summary": self.executor.summary(),
            }),
            "advanced_terminal_agent",
        );

        self.interactions += 1;
        if self.interactions % self.settings.auto_checkpoint_interval == 0 {
            if let Err(e) = self
                .session
                .save_checkpoint(&format!("auto_{}", self.interactions))
            {
                tracing::warn!(error = %e, "auto checkpoint failed");
            }
        }

        Ok(answer)
    }

    /// Runs every subtask of the plan: dependency check, argument
    /// injection, policy re-check, self-correcting dispatch.
    async fn execute_plan(
        &mut self,
        plan: &TaskPlan,
        question: &str,
    ) -> Result<Vec<ExecutionRecord>, AgentError> {
        let mut records: Vec<ExecutionRecord> = Vec::new();

        for task_id in &plan.execution_order {
            if self.client.is_cancelled() {
                return Err(AgentError::Mcp(McpError::Cancelled));
            }
            let Some(task) = plan.get_task(task_id) else {
                continue;
            };

            // Subtasks that failed validation never dispatch.
            if self.client.tool_spec(&task.tool_name).is_none() {
                records.push(skip_record(task, "invalid subtask: tool not advertised"));
                continue;
            }

            let deps_met = task.dependencies.iter().all(|dep| {
                records
                    .iter()
                    .any(|r| &r.task_id == dep && r.success)
            });
            if !deps_met {
                tracing::debug!(task = %task.id, "skipping, dependencies not met");
                records.push(skip_record(task, "dependencies not met"));
                continue;
            }

            let arguments = inject_previous_results(task, &records);

            match self.policy.evaluate(Action::Tool {
                name: &task.tool_name,
                arguments: &arguments,
            }) {
                PolicyDecision::Deny => {
                    tracing::info!(task = %task.id, tool = %task.tool_name, "skipping, policy denied");
                    records.push(skip_record(task, "policy denied"));
                    continue;
                }
                PolicyDecision::DryRun | PolicyDecision::Allow => {}
            }

            let observation = self
                .executor
                .act_with_retry(&self.client, SERVER_TERMINAL, &task.tool_name, arguments, question)
                .await;

            if let Some(rollback) = &task.rollback_action {
                self.rollback_stack.push(RollbackRecord {
                    task_id: task.id.clone(),
                    tool_name: rollback.tool_name.clone(),
                    arguments: rollback.arguments.clone(),
                });
            }

            self.session
                .add_context(observation.result.clone(), ContextKind::ToolResult);

            records.push(ExecutionRecord {
                task_id: task.id.clone(),
                tool: task.tool_name.clone(),
                success: observation.success,
                result: observation.result,
                skipped: None,
            });
        }

        Ok(records)
    }

    /// Pops the rollback stack and dispatches each compensating action in
    /// reverse order. Per-step failures are logged and do not halt the rest.
    pub async fn rollback(&mut self) {
        tracing::info!(steps = self.rollback_stack.len(), "starting rollback");
        while let Some(record) = self.rollback_stack.pop() {
            match self
                .client
                .call_tool(SERVER_TERMINAL, &record.tool_name, record.arguments.clone())
                .await
            {
                Ok(_) => tracing::info!(task = %record.task_id, "rolled back"),
                Err(e) => {
                    tracing::warn!(task = %record.task_id, error = %e, "rollback step failed")
                }
            }
        }
    }

    /// Reads one well-known resource; failure degrades to `None`, but
    /// cancellation propagates.
    async fn read_context_resource(&mut self, uri: &str) -> Result<Option<Value>, AgentError> {
        match self.client.read_resource(SERVER_TERMINAL, uri).await {
            Ok(value) => Ok(Some(value)),
            Err(McpError::Cancelled) => Err(AgentError::Mcp(McpError::Cancelled)),
            Err(e) => {
                tracing::debug!(uri, error = %e, "context resource unavailable");
                Ok(None)
            }
        }
    }

    // ---- accessors for the CLI driver ----------------------------------

    pub fn client(&self) -> &McpClient {
        &self.client
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }
}

fn skip_record(task: &SubTask, reason: &str) -> ExecutionRecord {
    ExecutionRecord {
        task_id: task.id.clone(),
        tool: task.tool_name.clone(),
        success: false,
        result: json!({"success": false, "skipped": reason}),
        skipped: Some(reason.to_string()),
    }
}

/// The single argument-injection rule: a `write_file`-shaped task with an
/// empty `content` inherits a textual rendering of the most recent
/// successful result.
fn inject_previous_results(task: &SubTask, records: &[ExecutionRecord]) -> Map<String, Value> {
    let mut arguments = task.arguments.clone();
    if task.tool_name != "write_file" {
        return arguments;
    }
    let content_empty = match arguments.get("content") {
        None => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Null) => true,
        Some(_) => false,
    };
    if !content_empty {
        return arguments;
    }

    for record in records.iter().rev() {
        if !record.success {
            continue;
        }
        let mut payload = &record.result;
        if let Some(inner) = payload.get("result") {
            payload = inner;
        }
        let rendered = format!(
            "Task: {}\nGenerated: {}\n\n=== Results ===\n{}",
            task.description,
            task.id,
            render_result(payload)
        );
        arguments.insert("content".into(), Value::String(rendered));
        break;
    }
    arguments
}

fn render_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn build_answer_prompt(
    question: &str,
    completed: usize,
    results: &[ExecutionRecord],
    compressed_context: &str,
) -> String {
    let results_json =
        serde_json::to_string_pretty(results).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"You are a helpful AI assistant. Answer the user's question based on the tool execution results.

User's question: {question}

Number of tasks completed: {completed}

Results from tools:
{results}

Additional context:
{context}

IMPORTANT: Respond in natural, conversational language. Do NOT return JSON. Do NOT return tool calls.
Explain what was done and what the results mean in a way that directly answers the user's question."#,
        question = question,
        completed = completed,
        results = results_json,
        context = compressed_context,
    )
}

/// Fallback answer when synthesis itself fails: the plan text plus the last
/// non-empty result.
fn default_answer(plan: &TaskPlan, results: &[ExecutionRecord]) -> String {
    let last_result = results
        .iter()
        .rev()
        .find(|r| !r.result.is_null() && r.skipped.is_none())
        .map(|r| render_result(&r.result))
        .unwrap_or_else(|| "no results were produced".to_string());
    format!(
        "Plan for \"{}\" ran {} step(s). Last result:\n{}",
        plan.goal,
        results.len(),
        last_result
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::SubTask;

    fn record(task_id: &str, success: bool, result: Value) -> ExecutionRecord {
        ExecutionRecord {
            task_id: task_id.into(),
            tool: "t".into(),
            success,
            result,
            skipped: None,
        }
    }

    /// **Scenario**: write_file with empty content inherits the latest
    /// successful result, rendered as text.
    #[test]
    fn injection_fills_empty_content() {
        let mut task = SubTask::new("t3", "write the report", "write_file");
        task.arguments.insert("path".into(), json!("report.txt"));
        task.arguments.insert("content".into(), json!(""));

        let records = vec![
            record("t1", true, json!({"result": "three files found"})),
            record("t2", false, json!({"error": "nope"})),
        ];
        let args = inject_previous_results(&task, &records);
        let content = args["content"].as_str().unwrap();
        assert!(content.contains("three files found"));
        assert!(content.contains("write the report"));
    }

    /// **Scenario**: Non-empty content and non-write tools are untouched.
    #[test]
    fn injection_leaves_filled_arguments() {
        let mut task = SubTask::new("t1", "d", "write_file");
        task.arguments.insert("content".into(), json!("already here"));
        let args = inject_previous_results(&task, &[record("x", true, json!("r"))]);
        assert_eq!(args["content"], "already here");

        let mut task = SubTask::new("t1", "d", "read_file");
        task.arguments.insert("path".into(), json!("a.txt"));
        let args = inject_previous_results(&task, &[record("x", true, json!("r"))]);
        assert!(args.get("content").is_none());
    }

    /// **Scenario**: The default answer names the goal and the last
    /// non-empty result.
    #[test]
    fn default_answer_uses_last_result() {
        let plan = TaskPlan::new("list files");
        let results = vec![
            record("t1", true, json!({"output": "a.txt b.txt"})),
            ExecutionRecord {
                task_id: "t2".into(),
                tool: "t".into(),
                success: false,
                result: json!({"success": false, "skipped": "policy denied"}),
                skipped: Some("policy denied".into()),
            },
        ];
        let answer = default_answer(&plan, &results);
        assert!(answer.contains("list files"));
        assert!(answer.contains("a.txt"));
    }
}

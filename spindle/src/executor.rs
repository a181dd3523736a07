//! Self-correcting executor: dispatch → observe → reflect → retry.
//!
//! One subtask runs through an explicit bounded loop (never recursion): a
//! failed observation is analysed by the oracle, and the first suggested
//! action replaces the current tool/arguments for the next attempt. The
//! loop ends on success, on attempt exhaustion, or when the reflection
//! offers no suggestion.

use std::sync::Arc;
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use crate::llm::{extract_json_object, Oracle};
use crate::mcp::{epoch_seconds, McpClient, ToolResponse};

/// Outcome of one tool dispatch.
#[derive(Debug, Clone)]
pub struct Observation {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub result: Value,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: f64,
}

/// Classification the oracle assigns to a failed observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionType {
    Success,
    PartialSuccess,
    Failure,
    NeedMoreInfo,
}

impl ReflectionType {
    fn from_str(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "partial_success" => Self::PartialSuccess,
            "need_more_info" => Self::NeedMoreInfo,
            _ => Self::Failure,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failure => "failure",
            Self::NeedMoreInfo => "need_more_info",
        }
    }
}

/// A next action the reflection proposes.
#[derive(Debug, Clone)]
pub struct SuggestedAction {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub reason: String,
}

/// The oracle's analysis of a failed observation.
#[derive(Debug, Clone)]
pub struct Reflection {
    pub reflection_type: ReflectionType,
    pub insights: Vec<String>,
    pub suggested_actions: Vec<SuggestedAction>,
    pub confidence: f64,
    pub reasoning: String,
}

/// Executes subtasks with bounded automatic recovery.
///
/// Observation and reflection histories live as long as the executor; the
/// `summary()` snapshot goes into the audit trail.
///
/// **Interaction**: Owned by the `Agent` façade; dispatches through the
/// `McpClient` and reflects through the oracle.
pub struct SelfCorrectingExecutor {
    oracle: Arc<dyn Oracle>,
    max_retries: u32,
    observations: Mutex<Vec<Observation>>,
    reflections: Mutex<Vec<Reflection>>,
}

impl SelfCorrectingExecutor {
    pub fn new(oracle: Arc<dyn Oracle>, max_retries: u32) -> Self {
        Self {
            oracle,
            max_retries: max_retries.max(1),
            observations: Mutex::new(Vec::new()),
            reflections: Mutex::new(Vec::new()),
        }
    }

    /// Runs one subtask with up to `max_retries` dispatch attempts.
    ///
    /// Arguments are checked against the discovered schema first; unknown
    /// tools or argument names become failed observations (reflectable)
    /// rather than being silently rewritten. Returns the final observation
    /// — success or the last failure.
    pub async fn act_with_retry(
        &self,
        client: &McpClient,
        server: &str,
        initial_tool: &str,
        initial_args: Map<String, Value>,
        goal: &str,
    ) -> Observation {
        let mut tool = initial_tool.to_string();
        let mut args = initial_args;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            tracing::debug!(tool = %tool, attempt, "dispatching subtask attempt");

            let observation = match schema_mismatch(client, &tool, &args) {
                Some(problem) => self.observe(
                    &tool,
                    &args,
                    json!({"success": false, "error": problem.clone()}),
                    false,
                    Some(problem),
                ),
                None => match client.call_tool(server, &tool, args.clone()).await {
                    Ok(response) => self.observe_response(&tool, &args, &response),
                    Err(err) => {
                        let msg = err.to_string();
                        self.observe(
                            &tool,
                            &args,
                            json!({"success": false, "error": msg.clone()}),
                            false,
                            Some(msg),
                        )
                    }
                },
            };

            if observation.success {
                return observation;
            }
            if attempt >= self.max_retries {
                tracing::warn!(tool = %tool, attempts = attempt, "retries exhausted");
                return observation;
            }

            let reflection = self.reflect(&observation, goal).await;
            let Some(suggestion) = reflection.suggested_actions.into_iter().next() else {
                tracing::debug!("no alternative action suggested, stopping");
                return observation;
            };
            tracing::debug!(
                next_tool = %suggestion.tool_name,
                reason = %suggestion.reason,
                "retrying with suggested action"
            );
            tool = suggestion.tool_name;
            args = suggestion.arguments;
        }
    }

    /// Records one observation from a normalised tool response.
    fn observe_response(
        &self,
        tool: &str,
        args: &Map<String, Value>,
        response: &ToolResponse,
    ) -> Observation {
        self.observe(
            tool,
            args,
            response.to_value(),
            response.success(),
            response.error(),
        )
    }

    fn observe(
        &self,
        tool: &str,
        args: &Map<String, Value>,
        result: Value,
        success: bool,
        error: Option<String>,
    ) -> Observation {
        let observation = Observation {
            tool_name: tool.to_string(),
            arguments: args.clone(),
            result,
            success,
            error,
            timestamp: epoch_seconds(),
        };
        self.observations.lock().unwrap().push(observation.clone());
        observation
    }

    /// Asks the oracle to analyse a failed observation. Parse failure
    /// synthesises a `Failure` reflection with no suggestions, which
    /// terminates the retry loop.
    async fn reflect(&self, observation: &Observation, goal: &str) -> Reflection {
        let prompt = build_reflection_prompt(observation, goal);
        let reflection = match self.oracle.generate(&prompt).await {
            Ok(reply) => parse_reflection(&reply).unwrap_or_else(|| {
                failed_reflection("reflection reply was not parseable JSON")
            }),
            Err(e) => failed_reflection(&format!("reflection oracle call failed: {}", e)),
        };
        self.reflections.lock().unwrap().push(reflection.clone());
        reflection
    }

    /// Snapshot for the audit trail: totals, success rate, per-attempt tool
    /// names and timestamps, reflection rows.
    pub fn summary(&self) -> Value {
        let observations = self.observations.lock().unwrap();
        let reflections = self.reflections.lock().unwrap();
        let successes = observations.iter().filter(|o| o.success).count();
        let success_rate = if observations.is_empty() {
            0.0
        } else {
            successes as f64 / observations.len() as f64
        };
        json!({
            "total_observations": observations.len(),
            "total_reflections": reflections.len(),
            "success_rate": success_rate,
            "observations": observations.iter().map(|o| json!({
                "tool": o.tool_name,
                "success": o.success,
                "timestamp": o.timestamp,
            })).collect::<Vec<_>>(),
            "reflections": reflections.iter().map(|r| json!({
                "type": r.reflection_type.as_str(),
                "confidence": r.confidence,
                "insights": r.insights,
            })).collect::<Vec<_>>(),
        })
    }

    /// Number of observations recorded so far.
    pub fn observation_count(&self) -> usize {
        self.observations.lock().unwrap().len()
    }
}

/// Returns a problem description when the tool is unknown or an argument
/// name is not in its schema; `None` means dispatchable.
fn schema_mismatch(client: &McpClient, tool: &str, args: &Map<String, Value>) -> Option<String> {
    let Some(spec) = client.tool_spec(tool) else {
        return Some(format!("unknown tool: {}", tool));
    };
    let Some(properties) = spec.input_schema.get("properties").and_then(Value::as_object) else {
        return None;
    };
    if properties.is_empty() {
        return None;
    }
    for key in args.keys() {
        if !properties.contains_key(key) {
            return Some(format!(
                "argument '{}' not in schema for tool '{}' (expected one of: {})",
                key,
                tool,
                properties.keys().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
    }
    None
}

fn failed_reflection(reason: &str) -> Reflection {
    Reflection {
        reflection_type: ReflectionType::Failure,
        insights: vec!["failed to analyse observation".to_string()],
        suggested_actions: Vec::new(),
        confidence: 0.0,
        reasoning: reason.to_string(),
    }
}

fn parse_reflection(reply: &str) -> Option<Reflection> {
    let parsed = extract_json_object(reply)?;
    let reflection_type = parsed
        .get("reflection_type")
        .and_then(Value::as_str)
        .map(ReflectionType::from_str)?;

    let insights = parsed
        .get("insights")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let suggested_actions = parsed
        .get("suggested_actions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let tool_name = item
                        .get("tool")
                        .or_else(|| item.get("tool_name"))?
                        .as_str()?
                        .to_string();
                    Some(SuggestedAction {
                        tool_name,
                        arguments: item
                            .get("arguments")
                            .and_then(Value::as_object)
                            .cloned()
                            .unwrap_or_default(),
                        reason: item
                            .get("reason")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(Reflection {
        reflection_type,
        insights,
        suggested_actions,
        confidence: parsed
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0),
        reasoning: parsed
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    })
}

fn build_reflection_prompt(observation: &Observation, goal: &str) -> String {
    format!(
        r#"You are an AI agent analysing the result of a tool execution.

GOAL: {goal}

TOOL EXECUTED: {tool}
ARGUMENTS: {args}
SUCCESS: {success}
RESULT: {result}
ERROR: {error}

TASK: Analyse this result and provide guidance.

OUTPUT FORMAT (JSON only):
{{
  "reflection_type": "success|partial_success|failure|need_more_info",
  "insights": ["insight 1"],
  "suggested_actions": [
    {{"tool": "tool_name", "arguments": {{}}, "reason": "why this action"}}
  ],
  "confidence": 0.0,
  "reasoning": "explain your analysis"
}}"#,
        goal = goal,
        tool = observation.tool_name,
        args = Value::Object(observation.arguments.clone()),
        success = observation.success,
        result = observation.result,
        error = observation.error.as_deref().unwrap_or("none"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Reflection parsing maps all fields and clamps confidence.
    #[test]
    fn parse_reflection_full() {
        let reply = r#"```json
{
  "reflection_type": "failure",
  "insights": ["path was wrong"],
  "suggested_actions": [
    {"tool": "read_file", "arguments": {"path": "config.ini"}, "reason": "try the full name"}
  ],
  "confidence": 1.7,
  "reasoning": "ENOENT means the file name was wrong"
}
```"#;
        let r = parse_reflection(reply).unwrap();
        assert_eq!(r.reflection_type, ReflectionType::Failure);
        assert_eq!(r.insights, vec!["path was wrong"]);
        assert_eq!(r.suggested_actions.len(), 1);
        assert_eq!(r.suggested_actions[0].tool_name, "read_file");
        assert!((r.confidence - 1.0).abs() < f64::EPSILON);
    }

    /// **Scenario**: Unparseable replies yield None; the caller synthesises
    /// a failure reflection with no suggestions.
    #[test]
    fn parse_reflection_garbage() {
        assert!(parse_reflection("sorry, I had trouble").is_none());
        let fallback = failed_reflection("x");
        assert_eq!(fallback.reflection_type, ReflectionType::Failure);
        assert!(fallback.suggested_actions.is_empty());
    }

    /// **Scenario**: An unknown reflection_type string degrades to Failure.
    #[test]
    fn unknown_reflection_type_is_failure() {
        let r = parse_reflection(r#"{"reflection_type": "wat", "insights": []}"#).unwrap();
        assert_eq!(r.reflection_type, ReflectionType::Failure);
    }

    /// **Scenario**: The reflection prompt includes tool, error and goal.
    #[test]
    fn reflection_prompt_contents() {
        let observation = Observation {
            tool_name: "read_file".into(),
            arguments: Map::new(),
            result: json!({"success": false}),
            success: false,
            error: Some("ENOENT".into()),
            timestamp: 0.0,
        };
        let prompt = build_reflection_prompt(&observation, "read the config");
        assert!(prompt.contains("read_file"));
        assert!(prompt.contains("ENOENT"));
        assert!(prompt.contains("read the config"));
    }
}

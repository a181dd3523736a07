//! Scripted transport for tests: fixed discovery lists, per-target response
//! scripts, and a full call log so tests can assert transport activity (or
//! its absence).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::transport::{McpTransport, TransportError};

type Script = VecDeque<Result<Value, TransportError>>;

/// In-memory MCP transport with scripted responses.
///
/// Discovery methods answer from the configured tool/resource/prompt lists.
/// `tools/call` responses are scripted per tool name and `resources/read`
/// per URI; scripts are consumed in order with the last entry repeating.
/// Unscripted targets succeed with `{"success": true}`.
///
/// **Interaction**: Passed to `McpClient::connect` in tests; `calls()` and
/// `call_count` back the gate-ordering, cache-idempotence, retry-bound and
/// breaker properties.
#[derive(Default)]
pub struct MockTransport {
    tools: Vec<Value>,
    resources: Vec<Value>,
    prompts: Vec<Value>,
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertises a tool with an object schema listing `properties` by name.
    pub fn with_tool(mut self, name: &str, description: &str, properties: &[&str]) -> Self {
        let props: serde_json::Map<String, Value> = properties
            .iter()
            .map(|p| (p.to_string(), json!({"type": "string"})))
            .collect();
        self.tools.push(json!({
            "name": name,
            "description": description,
            "inputSchema": {"type": "object", "properties": props},
        }));
        self
    }

    /// Advertises a resource.
    pub fn with_resource(mut self, uri: &str, name: &str) -> Self {
        self.resources
            .push(json!({"uri": uri, "name": name, "description": name}));
        self
    }

    /// Advertises a prompt.
    pub fn with_prompt(mut self, name: &str, description: &str) -> Self {
        self.prompts
            .push(json!({"name": name, "description": description}));
        self
    }

    /// Queues one `tools/call` response for `tool`. The wire shape is the
    /// MCP content list carrying the JSON as text, as real servers send it.
    pub fn push_tool_result(&self, tool: &str, result: Value) {
        self.push_script(
            format!("tools/call:{}", tool),
            Ok(json!({
                "content": [{"type": "text", "text": result.to_string()}]
            })),
        );
    }

    /// Queues one transport failure for `tool`.
    pub fn push_tool_error(&self, tool: &str, message: &str) {
        self.push_script(
            format!("tools/call:{}", tool),
            Err(TransportError::Io(message.to_string())),
        );
    }

    /// Queues one `resources/read` response for `uri`.
    pub fn push_resource_result(&self, uri: &str, result: Value) {
        self.push_script(
            format!("resources/read:{}", uri),
            Ok(json!({
                "contents": [{"uri": uri, "text": result.to_string()}]
            })),
        );
    }

    /// Queues one `prompts/get` response for `name`.
    pub fn push_prompt_result(&self, name: &str, text: &str) {
        self.push_script(
            format!("prompts/get:{}", name),
            Ok(json!({
                "messages": [{"role": "user", "content": {"type": "text", "text": text}}]
            })),
        );
    }

    /// Replaces the script for `tool` with a single repeating success.
    pub fn set_tool_result(&self, tool: &str, result: Value) {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.entry(format!("tools/call:{}", tool)).or_default();
        queue.clear();
        queue.push_back(Ok(json!({
            "content": [{"type": "text", "text": result.to_string()}]
        })));
    }

    /// Replaces the script for `tool` with a single repeating failure.
    pub fn set_tool_error(&self, tool: &str, message: &str) {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.entry(format!("tools/call:{}", tool)).or_default();
        queue.clear();
        queue.push_back(Err(TransportError::Io(message.to_string())));
    }

    fn push_script(&self, key: String, entry: Result<Value, TransportError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(entry);
    }

    /// All requests seen, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests for a method (e.g. `"tools/call"`).
    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    /// Number of `tools/call` requests for one tool name.
    pub fn tool_call_count(&self, tool: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p)| m == "tools/call" && p["name"] == tool)
            .count()
    }

    fn script_key(method: &str, params: &Value) -> Option<String> {
        match method {
            "tools/call" => params["name"].as_str().map(|n| format!("tools/call:{}", n)),
            "resources/read" => params["uri"]
                .as_str()
                .map(|u| format!("resources/read:{}", u)),
            "prompts/get" => params["name"].as_str().map(|n| format!("prompts/get:{}", n)),
            _ => None,
        }
    }

    fn next_scripted(&self, key: &str) -> Option<Result<Value, TransportError>> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl McpTransport for MockTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        match method {
            "tools/list" => Ok(json!({"tools": self.tools})),
            "resources/list" => Ok(json!({"resources": self.resources})),
            "prompts/list" => Ok(json!({"prompts": self.prompts})),
            _ => {
                if let Some(key) = Self::script_key(method, &params) {
                    if let Some(entry) = self.next_scripted(&key) {
                        return entry;
                    }
                }
                Ok(json!({
                    "content": [{"type": "text", "text": "{\"success\": true}"}]
                }))
            }
        }
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Scripted results are consumed in order; last repeats.
    #[tokio::test]
    async fn scripted_results_consumed_then_repeat() {
        let transport = MockTransport::new().with_tool("read_file", "Read a file", &["path"]);
        transport.push_tool_error("read_file", "ENOENT");
        transport.push_tool_result("read_file", json!({"success": true, "content": "[x]\n"}));

        let params = json!({"name": "read_file", "arguments": {"path": "cfg.ini"}});
        assert!(transport.request("tools/call", params.clone()).await.is_err());
        assert!(transport.request("tools/call", params.clone()).await.is_ok());
        assert!(transport.request("tools/call", params).await.is_ok());
        assert_eq!(transport.tool_call_count("read_file"), 3);
    }

    /// **Scenario**: Discovery lists reflect the configured sets.
    #[tokio::test]
    async fn discovery_lists() {
        let transport = MockTransport::new()
            .with_tool("system_info", "System info", &[])
            .with_resource("session://cwd", "cwd")
            .with_prompt("summarise", "Summarise");
        let tools = transport.request("tools/list", json!({})).await.unwrap();
        assert_eq!(tools["tools"].as_array().unwrap().len(), 1);
        let resources = transport.request("resources/list", json!({})).await.unwrap();
        assert_eq!(resources["resources"][0]["uri"], "session://cwd");
        let prompts = transport.request("prompts/list", json!({})).await.unwrap();
        assert_eq!(prompts["prompts"][0]["name"], "summarise");
    }
}

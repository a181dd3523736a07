//! MCP client: the sole outward surface to the tool server.
//!
//! Every side-effect request on the agent side traverses this client. Each
//! operation runs the same pipeline: policy gate → cancellation check →
//! cache lookup → circuit-breaker check → transport attempts under one
//! wall-clock deadline. Failures below this boundary become data for the
//! executor; only permission, timeout, breaker and cancellation conditions
//! surface as errors.

mod breaker;
mod cache;
mod envelope;
mod mock;
mod response;
mod trace;
mod transport;

pub use cache::{cache_key, canonical_arguments, CacheKey, CacheKind};
pub use mock::MockTransport;
pub use response::{normalize_resource, ToolResponse};
pub use trace::{epoch_seconds, TraceEvent};
pub use transport::{McpTransport, StdioTransport, TransportError};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::llm::{Oracle, OracleError};
use crate::policy::{Action, PolicyDecision, PolicyEngine};
use crate::settings::Settings;

use breaker::CircuitBreaker;
use cache::ResponseCache;
use trace::TraceLog;

/// The only server name this deployment defines.
pub const SERVER_TERMINAL: &str = "terminal";

/// Errors surfaced by MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The policy gate or resource allow-set refused the call.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// `cancel()` was observed at an entry point.
    #[error("client cancelled")]
    Cancelled,
    /// The per-operation wall-clock deadline elapsed (covers all retries).
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The circuit for this key is open; no transport was touched.
    #[error("circuit open for {key}, retry in {retry_in:?}")]
    BreakerOpen { key: String, retry_in: Duration },
    /// Resource read failed after exhausting retries.
    #[error("resource read failed: {0}")]
    ResourceRead(String),
    /// Tool call failed after exhausting retries.
    #[error("tool execution failed: {0}")]
    ToolExecution(String),
    /// Prompt fetch failed after exhausting retries.
    #[error("prompt fetch failed: {0}")]
    Prompt(String),
    /// The server name is not configured.
    #[error("unknown server: {0}")]
    UnknownServer(String),
    /// Connection or discovery failed.
    #[error("transport: {0}")]
    Transport(String),
    /// The oracle call inside `get_prompt` failed.
    #[error("oracle: {0}")]
    Oracle(#[from] OracleError),
}

/// A tool advertised by the server, aligned with the `tools/list` item.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// A resource advertised by the server.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSpec {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
}

/// A prompt advertised by the server.
#[derive(Debug, Clone, Serialize)]
pub struct PromptSpec {
    pub name: String,
    pub description: Option<String>,
}

/// One entry in the client-side observation buffer.
#[derive(Debug, Clone, Serialize)]
pub struct ContextEntry {
    pub timestamp: f64,
    pub op: String,
    pub target: String,
    pub payload: Value,
}

/// MCP client over one transport.
///
/// Scoped resource: `connect` discovers capabilities, `close` tears the
/// transport down. Cache, breaker, trace log and observation buffer are
/// private; no component outside this client mutates them.
pub struct McpClient {
    transport: Arc<dyn McpTransport>,
    oracle: Arc<dyn Oracle>,
    policy: PolicyEngine,
    settings: Settings,
    tools: Vec<ToolSpec>,
    resources: Vec<ResourceSpec>,
    prompts: Vec<PromptSpec>,
    cache: Mutex<ResponseCache>,
    breaker: Mutex<CircuitBreaker>,
    trace: Mutex<TraceLog>,
    context: Mutex<VecDeque<ContextEntry>>,
    cancelled: AtomicBool,
}

impl McpClient {
    /// Connects over the given transport: discovers tools, resources and
    /// prompts and snapshots them. Tool discovery is required; missing
    /// resource/prompt listings degrade to empty sets.
    pub async fn connect(
        transport: Arc<dyn McpTransport>,
        oracle: Arc<dyn Oracle>,
        policy: PolicyEngine,
        settings: Settings,
    ) -> Result<Self, McpError> {
        let tools_raw = transport
            .request("tools/list", json!({}))
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let tools = parse_tools(&tools_raw);

        let resources = match transport.request("resources/list", json!({})).await {
            Ok(raw) => parse_resources(&raw),
            Err(e) => {
                tracing::debug!(error = %e, "resources/list unavailable");
                Vec::new()
            }
        };
        let prompts = match transport.request("prompts/list", json!({})).await {
            Ok(raw) => parse_prompts(&raw),
            Err(e) => {
                tracing::debug!(error = %e, "prompts/list unavailable");
                Vec::new()
            }
        };

        let mut trace_log = TraceLog::new(settings.trace_enabled);
        trace_log.record(
            "client_connected",
            json!({
                "tools": tools.len(),
                "resources": resources.len(),
                "prompts": prompts.len(),
            }),
        );
        tracing::info!(
            tools = tools.len(),
            resources = resources.len(),
            prompts = prompts.len(),
            "mcp client connected"
        );

        Ok(Self {
            cache: Mutex::new(ResponseCache::new(settings.cache_ttl, settings.cache_enabled)),
            breaker: Mutex::new(CircuitBreaker::new(
                settings.failure_threshold,
                settings.breaker_cooldown,
            )),
            trace: Mutex::new(trace_log),
            context: Mutex::new(VecDeque::new()),
            cancelled: AtomicBool::new(false),
            transport,
            oracle,
            policy,
            settings,
            tools,
            resources,
            prompts,
        })
    }

    /// Reads a resource by URI through the full pipeline.
    pub async fn read_resource(&self, server: &str, uri: &str) -> Result<Value, McpError> {
        self.ensure_server(server)?;
        self.ensure_live()?;

        match self.policy.evaluate(Action::Resource { uri }) {
            PolicyDecision::Deny => {
                return Err(McpError::PermissionDenied(format!("policy denied: {}", uri)))
            }
            PolicyDecision::DryRun => return Ok(json!({"dry_run": true, "uri": uri})),
            PolicyDecision::Allow => {}
        }
        self.ensure_resource_allowed(uri)?;

        let key = cache_key(CacheKind::Resource, server, uri, &Value::Null);
        if let Some(hit) = self.cache_get(&key) {
            return Ok(hit);
        }
        self.ensure_circuit_closed(&key)?;

        let params = json!({"uri": uri});
        match self.transport_attempts("resources/read", params, &key, CacheKind::Resource).await {
            Ok(raw) => {
                let value = normalize_resource(&raw);
                self.cache_set(&key, value.clone());
                self.record("read_resource", json!({"uri": uri}));
                self.push_context("read_resource", uri, value.clone());
                Ok(value)
            }
            Err(err) => {
                self.record("resource_error", json!({"uri": uri, "error": err.to_string()}));
                Err(err)
            }
        }
    }

    /// Calls a tool through the full pipeline; the result is normalised once
    /// here and consumed as a [`ToolResponse`] everywhere downstream.
    pub async fn call_tool(
        &self,
        server: &str,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolResponse, McpError> {
        self.ensure_server(server)?;
        self.ensure_live()?;

        match self.policy.evaluate(Action::Tool {
            name,
            arguments: &arguments,
        }) {
            PolicyDecision::Deny => {
                return Err(McpError::PermissionDenied(format!("policy denied: {}", name)))
            }
            PolicyDecision::DryRun => {
                self.record("call_tool", json!({"name": name, "dry_run": true}));
                return Ok(ToolResponse::dry_run(name));
            }
            PolicyDecision::Allow => {}
        }

        let args_value = Value::Object(arguments.clone());
        let key = cache_key(CacheKind::Tool, server, name, &args_value);
        if let Some(hit) = self.cache_get(&key) {
            return Ok(ToolResponse::from_wire(&hit));
        }
        self.ensure_circuit_closed(&key)?;

        let params = json!({"name": name, "arguments": args_value});
        match self.transport_attempts("tools/call", params, &key, CacheKind::Tool).await {
            Ok(raw) => {
                let response = ToolResponse::from_wire(&raw);
                // Only successful responses are cacheable; a failed result
                // must reach the transport again on retry.
                if response.success() {
                    self.cache_set(&key, raw);
                    self.push_context("call_tool", name, response.to_value());
                }
                self.record("call_tool", json!({"name": name, "success": response.success()}));
                Ok(response)
            }
            Err(err) => {
                self.record("tool_error", json!({"name": name, "error": err.to_string()}));
                Err(err)
            }
        }
    }

    /// Fetches a templated prompt and renders it through the oracle; the
    /// oracle call is part of this operation.
    pub async fn get_prompt(
        &self,
        server: &str,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, McpError> {
        self.ensure_server(server)?;
        self.ensure_live()?;

        if self.policy.evaluate(Action::Prompt { name }) == PolicyDecision::Deny {
            return Err(McpError::PermissionDenied(format!("policy denied: {}", name)));
        }

        let args_value = Value::Object(arguments.clone());
        let key = cache_key(CacheKind::Prompt, server, name, &args_value);
        let raw = if let Some(hit) = self.cache_get(&key) {
            hit
        } else {
            self.ensure_circuit_closed(&key)?;
            let params = json!({"name": name, "arguments": args_value});
            let raw = self
                .transport_attempts("prompts/get", params, &key, CacheKind::Prompt)
                .await?;
            self.cache_set(&key, raw.clone());
            raw
        };

        let template = prompt_text(&raw);
        Ok(self.oracle.generate(&template).await?)
    }

    /// Requests cancellation: the next entry-point check on any operation
    /// refuses with `Cancelled`. In-flight transport calls are not
    /// interrupted, but they will not retry.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel()` has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Tears the transport down. Safe to call more than once.
    pub async fn close(&self) {
        let _ = self.transport.shutdown().await;
    }

    // ---- discovery snapshots -------------------------------------------

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    pub fn tool_spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn prompts(&self) -> &[PromptSpec] {
        &self.prompts
    }

    // ---- diagnostics ----------------------------------------------------

    /// Snapshot of the bounded observation buffer.
    pub fn context(&self) -> Vec<ContextEntry> {
        self.context.lock().unwrap().iter().cloned().collect()
    }

    /// Snapshot of the trace log.
    pub fn trace(&self) -> Vec<TraceEvent> {
        self.trace.lock().unwrap().snapshot()
    }

    /// (live entries, total entries) in the response cache.
    pub fn cache_stats(&self) -> (usize, usize) {
        self.cache.lock().unwrap().stats()
    }

    /// Drops every cached response.
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    // ---- pipeline internals --------------------------------------------

    fn ensure_server(&self, server: &str) -> Result<(), McpError> {
        if server == SERVER_TERMINAL {
            Ok(())
        } else {
            Err(McpError::UnknownServer(server.to_string()))
        }
    }

    fn ensure_live(&self) -> Result<(), McpError> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(McpError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn ensure_resource_allowed(&self, uri: &str) -> Result<(), McpError> {
        if self.settings.allowed_resources.iter().any(|a| a == uri) {
            return Ok(());
        }
        if uri.starts_with("file://") && uri.starts_with(&self.settings.file_resource_prefix) {
            return Ok(());
        }
        Err(McpError::PermissionDenied(format!(
            "resource not in allow-set: {}",
            uri
        )))
    }

    fn ensure_circuit_closed(&self, key: &CacheKey) -> Result<(), McpError> {
        if let Some(retry_in) = self.breaker.lock().unwrap().open_for(key) {
            return Err(McpError::BreakerOpen {
                key: format!("{}:{}:{}", key.0.as_str(), key.1, key.2),
                retry_in,
            });
        }
        Ok(())
    }

    fn cache_get(&self, key: &CacheKey) -> Option<Value> {
        let hit = self.cache.lock().unwrap().get(key);
        if hit.is_some() {
            self.record("cache_hit", json!({"kind": key.0.as_str(), "name": key.2}));
        }
        hit
    }

    fn cache_set(&self, key: &CacheKey, value: Value) {
        self.cache.lock().unwrap().set(key.clone(), value);
        self.record("cache_set", json!({"kind": key.0.as_str(), "name": key.2}));
    }

    fn record(&self, event: &str, payload: Value) {
        self.trace.lock().unwrap().record(event, payload);
    }

    fn push_context(&self, op: &str, target: &str, payload: Value) {
        let evicted = {
            let mut buffer = self.context.lock().unwrap();
            let evicted = if buffer.len() >= self.settings.max_context_items {
                buffer.pop_front();
                true
            } else {
                false
            };
            buffer.push_back(ContextEntry {
                timestamp: epoch_seconds(),
                op: op.to_string(),
                target: target.to_string(),
                payload,
            });
            evicted
        };
        if evicted {
            self.record("context_evicted", json!({"op": op}));
        }
        self.record("context_added", json!({"op": op, "target": target}));
    }

    fn note_failure(&self, key: &CacheKey) {
        let opened = self.breaker.lock().unwrap().record_failure(key);
        if opened {
            self.record(
                "circuit_opened",
                json!({"kind": key.0.as_str(), "name": key.2}),
            );
            tracing::warn!(key = %key.2, "circuit opened");
        }
    }

    /// Transport attempts under the operation deadline: up to
    /// `max_retries + 1` attempts, short backoff between them, no retry for
    /// timeout or cancellation. One exhausted operation counts one breaker
    /// failure.
    async fn transport_attempts(
        &self,
        method: &str,
        params: Value,
        key: &CacheKey,
        kind: CacheKind,
    ) -> Result<Value, McpError> {
        let deadline = Instant::now() + self.settings.resource_timeout;
        let mut last_error = String::new();
        let mut attempt = 0u32;

        while attempt <= self.settings.max_retries {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(McpError::Cancelled);
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                self.note_failure(key);
                return Err(McpError::Timeout(self.settings.resource_timeout));
            };
            attempt += 1;

            match tokio::time::timeout(remaining, self.transport.request(method, params.clone()))
                .await
            {
                Ok(Ok(value)) => {
                    self.breaker.lock().unwrap().record_success(key);
                    return Ok(value);
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    tracing::debug!(method, attempt, error = %last_error, "transport attempt failed");
                    if attempt <= self.settings.max_retries {
                        tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                    }
                }
                Err(_) => {
                    self.note_failure(key);
                    return Err(McpError::Timeout(self.settings.resource_timeout));
                }
            }
        }

        self.note_failure(key);
        Err(match kind {
            CacheKind::Resource => McpError::ResourceRead(last_error),
            CacheKind::Tool => McpError::ToolExecution(last_error),
            CacheKind::Prompt => McpError::Prompt(last_error),
        })
    }
}

fn parse_tools(raw: &Value) -> Vec<ToolSpec> {
    raw.get("tools")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|t| ToolSpec {
                    name: t["name"].as_str().unwrap_or_default().to_string(),
                    description: t["description"].as_str().map(String::from),
                    input_schema: t.get("inputSchema").cloned().unwrap_or(json!({})),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_resources(raw: &Value) -> Vec<ResourceSpec> {
    raw.get("resources")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|r| ResourceSpec {
                    uri: r["uri"].as_str().unwrap_or_default().to_string(),
                    name: r["name"].as_str().unwrap_or_default().to_string(),
                    description: r["description"].as_str().map(String::from),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_prompts(raw: &Value) -> Vec<PromptSpec> {
    raw.get("prompts")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|p| PromptSpec {
                    name: p["name"].as_str().unwrap_or_default().to_string(),
                    description: p["description"].as_str().map(String::from),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Joins the text parts of a `prompts/get` result into one template string.
fn prompt_text(raw: &Value) -> String {
    raw.get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| match m.get("content") {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(content) => content.get("text").and_then(Value::as_str).map(String::from),
                    None => None,
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

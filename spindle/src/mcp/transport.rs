//! MCP transport: trait plus the stdio implementation.
//!
//! `StdioTransport` spawns the tool-server process, performs the MCP
//! initialize handshake, and demultiplexes responses by request id: a reader
//! task routes each incoming result to the oneshot waiter registered for its
//! id, so multiple logical operations can be in flight over the one pipe.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};

use super::envelope::{Incoming, Notification, Request, Response};

/// Protocol version sent in the initialize handshake.
const PROTOCOL_VERSION: &str = "2025-11-25";

/// Errors from the transport layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("transport closed")]
    Closed,
    #[error("i/o: {0}")]
    Io(String),
    #[error("JSON-RPC error: {0}")]
    Rpc(String),
    #[error("initialize failed: {0}")]
    Initialize(String),
}

/// Request/response channel to one MCP server.
///
/// Implementations are async-safe: concurrent `request` calls may interleave
/// on the wire and are matched back by id.
///
/// **Interaction**: `McpClient` owns exactly one transport and wraps every
/// call with policy, cache, retry and breaker handling. `MockTransport`
/// implements this trait for tests.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Sends one request and waits for its result.
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Tears the channel down. Idempotent.
    async fn shutdown(&self) -> Result<(), TransportError>;
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>>;

/// Stdio transport: child process speaking newline-delimited JSON-RPC.
pub struct StdioTransport {
    next_id: AtomicU64,
    pending: PendingMap,
    stdin: Arc<Mutex<ChildStdin>>,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawns the server process and completes the initialize handshake.
    ///
    /// `env` entries are passed to the child (e.g. credentials for the tool
    /// server); when `stderr_verbose` is false, child stderr is discarded.
    pub async fn connect(
        command: impl Into<String>,
        args: Vec<String>,
        env: Vec<(String, String)>,
        stderr_verbose: bool,
    ) -> Result<Self, TransportError> {
        let command = command.into();
        let mut cmd = Command::new(&command);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if stderr_verbose {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| TransportError::Spawn(format!("{}: {}", command, e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Spawn("no stdin pipe".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Spawn("no stdout pipe".into()))?;

        let transport = Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            stdin: Arc::new(Mutex::new(stdin)),
            child: Mutex::new(Some(child)),
        };

        spawn_reader(stdout, Arc::clone(&transport.pending), Arc::clone(&transport.stdin));

        transport.initialize().await?;
        Ok(transport)
    }

    /// Sends `initialize`, waits for the result, then `notifications/initialized`.
    async fn initialize(&self) -> Result<(), TransportError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {}, "resources": {}, "prompts": {} },
            "clientInfo": {
                "name": "spindle-mcp",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        self.request("initialize", params)
            .await
            .map_err(|e| TransportError::Initialize(e.to_string()))?;

        let note = Notification::new("notifications/initialized", Some(json!({})));
        let line = serde_json::to_string(&note).map_err(|e| TransportError::Io(e.to_string()))?;
        write_line(&self.stdin, &line).await
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = Request::new(id, method, params);
        let line = serde_json::to_string(&request).map_err(|e| TransportError::Io(e.to_string()))?;
        if let Err(e) = write_line(&self.stdin, &line).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Closed),
        }
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
        Ok(())
    }
}

async fn write_line(stdin: &Arc<Mutex<ChildStdin>>, line: &str) -> Result<(), TransportError> {
    let mut guard = stdin.lock().await;
    guard
        .write_all(line.as_bytes())
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    guard
        .write_all(b"\n")
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    guard
        .flush()
        .await
        .map_err(|e| TransportError::Io(e.to_string()))
}

/// Reader task: routes results to waiters, answers `roots/list`, drops the
/// rest. On EOF every pending waiter gets `Closed`.
fn spawn_reader(
    stdout: tokio::process::ChildStdout,
    pending: PendingMap,
    stdin: Arc<Mutex<ChildStdin>>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "mcp stdout read error");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let msg: Incoming = match serde_json::from_str(&line) {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping non-JSON-RPC line");
                    continue;
                }
            };

            if msg.is_result() {
                if let Some(id) = msg.request_id() {
                    if let Some(tx) = pending.lock().await.remove(&id) {
                        let outcome = match msg.error {
                            Some(err) => Err(TransportError::Rpc(err.message)),
                            None => Ok(msg.result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                }
            } else if msg.is_server_request() {
                if msg.method.as_deref() == Some("roots/list") {
                    let id = msg.id.clone().unwrap_or(Value::Null);
                    let response = Response::success(id, json!({ "roots": [] }));
                    if let Ok(line) = serde_json::to_string(&response) {
                        let _ = write_line(&stdin, &line).await;
                    }
                }
                // Other server requests are ignored; the server times out.
            }
        }

        let mut map = pending.lock().await;
        for (_, tx) in map.drain() {
            let _ = tx.send(Err(TransportError::Closed));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Spawning a nonexistent command surfaces Spawn.
    #[tokio::test]
    async fn connect_invalid_command_returns_spawn_error() {
        let result = StdioTransport::connect(
            "_nonexistent_command_that_does_not_exist_xyz_",
            vec![],
            vec![],
            false,
        )
        .await;
        assert!(matches!(result, Err(TransportError::Spawn(_))));
    }

    /// **Scenario**: A scripted cat-style echo server completes the handshake
    /// and answers a request by id.
    #[tokio::test]
    async fn stdio_round_trip_with_scripted_server() {
        // A tiny shell server: replies to initialize (id 1) and echo (id 2).
        let script = r#"
read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-11-25"}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"echo":true}}'
"#;
        let transport = StdioTransport::connect(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            vec![],
            false,
        )
        .await
        .expect("handshake");

        let result = transport
            .request("tools/list", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result["echo"], true);
        transport.shutdown().await.unwrap();
    }

    /// **Scenario**: Server exit fails pending requests with Closed.
    #[tokio::test]
    async fn server_exit_fails_pending_with_closed() {
        let script = r#"
read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}'
read line
"#;
        let transport = StdioTransport::connect(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            vec![],
            false,
        )
        .await
        .expect("handshake");

        let err = transport
            .request("tools/list", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed | TransportError::Io(_)));
    }
}

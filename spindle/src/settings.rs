//! Runtime settings for one agent instance.
//!
//! Every component receives an explicit [`Settings`] value on construction;
//! there is no module-level global state. Defaults match the production
//! deployment; `Settings::from_env` applies `SPINDLE_*` overrides after the
//! config crate has populated the process environment.

use std::path::PathBuf;
use std::time::Duration;

/// Tunable limits and paths for the agent runtime.
///
/// **Interaction**: Cloned into `McpClient`, `SelfCorrectingExecutor`,
/// `ToolChain`, `SessionManager`, `SessionMemory` and the `Agent` façade on
/// construction.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Extra transport attempts after the first one (total ≤ max_retries + 1).
    pub max_retries: u32,
    /// Per-operation wall-clock deadline, covering all retries.
    pub resource_timeout: Duration,
    /// Exhaustion events on one cache key before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before a probe is allowed.
    pub breaker_cooldown: Duration,
    /// Bound on the client-side observation buffer (FIFO eviction).
    pub max_context_items: usize,
    /// Concurrent tool calls within one parallel batch.
    pub max_parallel_tools: usize,
    /// Time-to-live for cached responses.
    pub cache_ttl: Duration,
    /// When false, every lookup misses and nothing is stored.
    pub cache_enabled: bool,
    /// When true, the MCP client records a trace event per significant action.
    pub trace_enabled: bool,
    /// Global dry-run mode: mutating tools are simulated, never dispatched.
    pub dry_run: bool,
    /// Dispatch attempts per subtask in the self-correcting executor.
    pub executor_max_retries: u32,
    /// Context items retained after a relevance prune.
    pub keep_top_n: usize,
    /// Soft token budget for compressed context (advisory).
    pub compress_max_tokens: usize,
    /// A session checkpoint is written every this many interactions.
    pub auto_checkpoint_interval: usize,
    /// Directory for `<session>_<label>.json` checkpoint files.
    pub checkpoint_dir: PathBuf,
    /// Append-only long-term memory file.
    pub memory_path: PathBuf,
    /// Exact resource URIs the client may read.
    pub allowed_resources: Vec<String>,
    /// Dynamically formed `file://` URIs must start with this prefix.
    pub file_resource_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            resource_timeout: Duration::from_secs(30),
            failure_threshold: 3,
            breaker_cooldown: Duration::from_secs(30),
            max_context_items: 50,
            max_parallel_tools: 5,
            cache_ttl: Duration::from_secs(60),
            cache_enabled: true,
            trace_enabled: true,
            dry_run: false,
            executor_max_retries: 3,
            keep_top_n: 20,
            compress_max_tokens: 4000,
            auto_checkpoint_interval: 10,
            checkpoint_dir: PathBuf::from("session_checkpoints"),
            memory_path: PathBuf::from("terminal_memory.json"),
            allowed_resources: vec![
                "session://cwd".to_string(),
                "session://tasks".to_string(),
                "system://info".to_string(),
                "system://env".to_string(),
                "system://disk".to_string(),
                "system://processes".to_string(),
                "workspace://tree".to_string(),
                "workspace://summary".to_string(),
                "git://status".to_string(),
                "git://diff".to_string(),
                "git://log".to_string(),
                "monitor://cpu".to_string(),
                "monitor://memory".to_string(),
                "monitor://disk".to_string(),
                "monitor://file-changes".to_string(),
                "metrics://tool-performance".to_string(),
                "cache://stats".to_string(),
            ],
            file_resource_prefix: "file:///home/".to_string(),
        }
    }
}

impl Settings {
    /// Builds settings from defaults plus `SPINDLE_*` environment overrides.
    ///
    /// Unparseable values are ignored so a stray variable cannot take the
    /// agent down. Recognised keys: `SPINDLE_MAX_RETRIES`,
    /// `SPINDLE_RESOURCE_TIMEOUT_SECONDS`, `SPINDLE_FAILURE_THRESHOLD`,
    /// `SPINDLE_CIRCUIT_BREAKER_COOLDOWN`, `SPINDLE_MAX_CONTEXT_ITEMS`,
    /// `SPINDLE_MAX_PARALLEL_TOOLS`, `SPINDLE_CACHE_TTL_SECONDS`,
    /// `SPINDLE_ENABLE_CACHE`, `SPINDLE_ENABLE_TRACING`, `SPINDLE_DRY_RUN`,
    /// `SPINDLE_CHECKPOINT_DIR`, `SPINDLE_MEMORY_FILE`.
    pub fn from_env() -> Self {
        let mut s = Self::default();
        if let Some(v) = env_parse::<u32>("SPINDLE_MAX_RETRIES") {
            s.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("SPINDLE_RESOURCE_TIMEOUT_SECONDS") {
            s.resource_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u32>("SPINDLE_FAILURE_THRESHOLD") {
            s.failure_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("SPINDLE_CIRCUIT_BREAKER_COOLDOWN") {
            s.breaker_cooldown = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("SPINDLE_MAX_CONTEXT_ITEMS") {
            s.max_context_items = v;
        }
        if let Some(v) = env_parse::<usize>("SPINDLE_MAX_PARALLEL_TOOLS") {
            s.max_parallel_tools = v;
        }
        if let Some(v) = env_parse::<u64>("SPINDLE_CACHE_TTL_SECONDS") {
            s.cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_bool("SPINDLE_ENABLE_CACHE") {
            s.cache_enabled = v;
        }
        if let Some(v) = env_bool("SPINDLE_ENABLE_TRACING") {
            s.trace_enabled = v;
        }
        if let Some(v) = env_bool("SPINDLE_DRY_RUN") {
            s.dry_run = v;
        }
        if let Ok(v) = std::env::var("SPINDLE_CHECKPOINT_DIR") {
            s.checkpoint_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SPINDLE_MEMORY_FILE") {
            s.memory_path = PathBuf::from(v);
        }
        s
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

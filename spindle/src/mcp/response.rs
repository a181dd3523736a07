//! Tool-response normalisation.
//!
//! The tool server returns one of three shapes; they are folded into one
//! tagged [`ToolResponse`] at the client boundary so no downstream consumer
//! (executor, argument injection) probes shapes again.

use serde_json::{Map, Value};

/// Normalised tool response, tagged by the wire shape it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponse {
    /// The result was already a mapping with tool-level fields.
    StructuredMap(Map<String, Value>),
    /// The result carried a `data` mapping; unwrapped.
    DataMap(Map<String, Value>),
    /// The result carried a `content` list whose first text element held the
    /// payload: parsed JSON mapping, or `{success: true, output: <text>}`
    /// when the text was not JSON.
    ContentText(Map<String, Value>),
}

impl ToolResponse {
    /// Builds a normalised response from the raw `tools/call` result.
    ///
    /// Precedence follows the wire contract: `data` mapping first, then the
    /// `content` text list, then the result used directly when it is a
    /// mapping. Anything else becomes a failed structured map.
    pub fn from_wire(raw: &Value) -> Self {
        if let Some(data) = raw.get("data").and_then(Value::as_object) {
            return Self::DataMap(data.clone());
        }

        if let Some(content) = raw.get("content").and_then(Value::as_array) {
            if let Some(text) = content
                .first()
                .and_then(|item| item.get("text"))
                .and_then(Value::as_str)
            {
                let map = match serde_json::from_str::<Value>(text) {
                    Ok(Value::Object(map)) => map,
                    _ => {
                        let mut map = Map::new();
                        map.insert("success".into(), Value::Bool(true));
                        map.insert("output".into(), Value::String(text.to_string()));
                        map
                    }
                };
                return Self::ContentText(map);
            }
        }

        if let Some(map) = raw.as_object() {
            return Self::StructuredMap(map.clone());
        }

        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(false));
        map.insert(
            "error".into(),
            Value::String(format!("cannot extract result from {}", kind_name(raw))),
        );
        Self::StructuredMap(map)
    }

    /// Synthetic success for dry-run diversions: the caller sees a
    /// successful outcome without any dispatch having happened.
    pub fn dry_run(tool: &str) -> Self {
        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(true));
        map.insert("dry_run".into(), Value::Bool(true));
        map.insert(
            "output".into(),
            Value::String(format!("[dry-run] {} simulated, no effect applied", tool)),
        );
        Self::StructuredMap(map)
    }

    /// The normalised mapping, whichever variant carries it.
    pub fn as_map(&self) -> &Map<String, Value> {
        match self {
            Self::StructuredMap(m) | Self::DataMap(m) | Self::ContentText(m) => m,
        }
    }

    /// Success flag: the mapping's `success` field is authoritative; a
    /// mapping without one counts as success (the call itself completed).
    pub fn success(&self) -> bool {
        match self.as_map().get("success") {
            Some(Value::Bool(b)) => *b,
            _ => true,
        }
    }

    /// The `error` field, when present.
    pub fn error(&self) -> Option<String> {
        self.as_map()
            .get("error")
            .and_then(Value::as_str)
            .map(String::from)
    }

    /// The mapping as an owned `Value` for records and prompts.
    pub fn to_value(&self) -> Value {
        Value::Object(self.as_map().clone())
    }
}

/// Normalises a `resources/read` result: first `contents` entry's text,
/// parsed as JSON when possible, else the raw text; a bare mapping passes
/// through.
pub fn normalize_resource(raw: &Value) -> Value {
    if let Some(first) = raw
        .get("contents")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    {
        if let Some(text) = first.get("text").and_then(Value::as_str) {
            return serde_json::from_str(text)
                .unwrap_or_else(|_| Value::String(text.to_string()));
        }
        return first.clone();
    }
    raw.clone()
}

fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: A `data` mapping is unwrapped and tagged DataMap.
    #[test]
    fn data_map_unwrapped() {
        let raw = json!({"data": {"success": true, "stdout": "hi"}});
        let r = ToolResponse::from_wire(&raw);
        assert!(matches!(r, ToolResponse::DataMap(_)));
        assert!(r.success());
        assert_eq!(r.as_map()["stdout"], "hi");
    }

    /// **Scenario**: Content-list JSON text is parsed into a mapping.
    #[test]
    fn content_text_json_parsed() {
        let raw = json!({
            "content": [{"type": "text", "text": "{\"success\": false, \"error\": \"ENOENT\"}"}]
        });
        let r = ToolResponse::from_wire(&raw);
        assert!(matches!(r, ToolResponse::ContentText(_)));
        assert!(!r.success());
        assert_eq!(r.error().as_deref(), Some("ENOENT"));
    }

    /// **Scenario**: Non-JSON content text wraps as success + output.
    #[test]
    fn content_text_plain_wrapped() {
        let raw = json!({"content": [{"type": "text", "text": "plain output"}]});
        let r = ToolResponse::from_wire(&raw);
        assert!(r.success());
        assert_eq!(r.as_map()["output"], "plain output");
    }

    /// **Scenario**: A bare mapping is used directly; its success field wins.
    #[test]
    fn structured_map_direct() {
        let raw = json!({"success": false, "error": "boom"});
        let r = ToolResponse::from_wire(&raw);
        assert!(matches!(r, ToolResponse::StructuredMap(_)));
        assert!(!r.success());
    }

    /// **Scenario**: Unusable shapes become a failed map, never a panic.
    #[test]
    fn unusable_shape_fails_closed() {
        let r = ToolResponse::from_wire(&json!(42));
        assert!(!r.success());
        assert!(r.error().unwrap().contains("number"));
    }

    /// **Scenario**: Dry-run responses read as success without dispatch.
    #[test]
    fn dry_run_reads_as_success() {
        let r = ToolResponse::dry_run("write_file");
        assert!(r.success());
        assert_eq!(r.as_map()["dry_run"], true);
    }

    /// **Scenario**: Resource contents text parses to JSON when possible.
    #[test]
    fn resource_normalisation() {
        let raw = json!({"contents": [{"uri": "session://cwd", "text": "{\"cwd\": \"/home/u\"}"}]});
        assert_eq!(normalize_resource(&raw)["cwd"], "/home/u");

        let raw = json!({"contents": [{"uri": "x://y", "text": "not json"}]});
        assert_eq!(normalize_resource(&raw), json!("not json"));

        let raw = json!({"cwd": "/tmp"});
        assert_eq!(normalize_resource(&raw)["cwd"], "/tmp");
    }
}

//! Defensive JSON extraction from LLM output.
//!
//! One shared routine for the planner, the reflector and the chain detector:
//! strip markdown fences, locate the outermost brace-balanced object,
//! tolerate trailing commas, and retry by trimming trailing garbage. Never
//! panics; total failure returns `None` and callers fall back to their
//! neutral default.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*```(?:json)?\s*$").unwrap())
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").unwrap())
}

/// Extracts the first JSON object from raw LLM output.
///
/// Handles surrounding prose, ```json fences and trailing commas. Returns
/// `None` when no parseable object can be recovered.
pub fn extract_json_object(raw: &str) -> Option<Value> {
    let cleaned = strip_fences(raw);
    let candidate = balanced_object(&cleaned)?;

    if let Ok(v) = serde_json::from_str::<Value>(candidate) {
        return Some(v);
    }

    // Second pass: drop trailing commas before } or ].
    let fixed = trailing_comma_re().replace_all(candidate, "$1");
    if let Ok(v) = serde_json::from_str::<Value>(&fixed) {
        return Some(v);
    }

    // Last resort: greedily shrink at '}' boundaries from the right, in case
    // the model glued text onto an otherwise valid object.
    let mut end = fixed.len();
    while let Some(pos) = fixed[..end].rfind('}') {
        let slice = &fixed[..=pos];
        if let Ok(v) = serde_json::from_str::<Value>(slice) {
            return Some(v);
        }
        if pos == 0 {
            break;
        }
        end = pos;
    }

    None
}

fn strip_fences(raw: &str) -> String {
    fence_open_re().replace_all(raw, "").trim().to_string()
}

/// Returns the outermost `{…}` slice, honouring strings and escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    // Unbalanced: hand back the tail and let the parser's retry loop try.
    Some(&text[start..])
}

//! Parse a project `.env` file into a key-value map.
//!
//! Parsing only; the precedence rule (existing env wins) is applied in
//! `lib.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Location of `.env`: `override_dir` when given, else the current
/// directory. `None` when no file exists there.
fn dotenv_path(override_dir: Option<&Path>) -> Option<PathBuf> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    let path = dir.join(".env");
    path.is_file().then_some(path)
}

/// Minimal `.env` parser.
///
/// Lines are `KEY=VALUE`; blank lines and `#` comments are skipped, an
/// optional leading `export ` is dropped, and surrounding single or double
/// quotes are stripped (double quotes support `\"`). No multiline values.
fn parse(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), unquote(value.trim()));
    }
    map
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return value[1..value.len() - 1].replace("\\\"", "\"");
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    value.to_string()
}

/// Loads `.env` into a map; a missing file is an empty map, not an error.
pub fn load_env_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    match dotenv_path(override_dir) {
        Some(path) => Ok(parse(&std::fs::read_to_string(path)?)),
        None => Ok(HashMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Plain, exported, quoted and commented lines parse as
    /// documented.
    #[test]
    fn parse_shapes() {
        let content = r#"
# spindle settings
SPINDLE_DRY_RUN=true
export SPINDLE_LLM_MODEL=qwen2.5-coder:7b
GREETING="say \"hi\""
QUOTED='single'
EMPTY=
not a key value line
=no_key
"#;
        let map = parse(content);
        assert_eq!(map.get("SPINDLE_DRY_RUN").map(String::as_str), Some("true"));
        assert_eq!(
            map.get("SPINDLE_LLM_MODEL").map(String::as_str),
            Some("qwen2.5-coder:7b")
        );
        assert_eq!(map.get("GREETING").map(String::as_str), Some("say \"hi\""));
        assert_eq!(map.get("QUOTED").map(String::as_str), Some("single"));
        assert_eq!(map.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(map.len(), 5);
    }

    /// **Scenario**: A missing file yields an empty map.
    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_map(Some(dir.path())).unwrap().is_empty());
    }

    /// **Scenario**: An existing file is read from the override directory.
    #[test]
    fn reads_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "A=1\n").unwrap();
        let map = load_env_map(Some(dir.path())).unwrap();
        assert_eq!(map.get("A").map(String::as_str), Some("1"));
    }
}

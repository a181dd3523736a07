//! Load the `[env]` table from `$XDG_CONFIG_HOME/<app>/config.toml`.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::LoadError;

/// `$XDG_CONFIG_HOME` when set, else the platform config directory.
fn config_base() -> Result<PathBuf, LoadError> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg));
        }
    }
    dirs::config_dir().ok_or_else(|| LoadError::XdgPath("no config directory".into()))
}

fn config_path(app_name: &str) -> Result<Option<PathBuf>, LoadError> {
    let path = config_base()?.join(app_name).join("config.toml");
    Ok(path.exists().then_some(path))
}

#[derive(serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Returns the `[env]` key-value pairs; a missing file or section is an
/// empty map.
pub fn load_env_map(app_name: &str) -> Result<HashMap<String, String>, LoadError> {
    let Some(path) = config_path(app_name)? else {
        return Ok(HashMap::new());
    };
    let content = std::fs::read_to_string(&path).map_err(LoadError::XdgRead)?;
    let config: ConfigFile = toml::from_str(&content)?;
    Ok(config.env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // XDG_CONFIG_HOME is process-global; these tests must not interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_xdg_home<T>(dir: &std::path::Path, f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let prev = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", dir);
        let out = f();
        match prev {
            Some(p) => env::set_var("XDG_CONFIG_HOME", p),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
        out
    }

    /// **Scenario**: No config file means an empty map.
    #[test]
    fn missing_config_is_empty() {
        let map = load_env_map("spindle-config-test-nonexistent-xyz").unwrap();
        assert!(map.is_empty());
    }

    /// **Scenario**: The `[env]` table is read from the app's config.toml.
    #[test]
    fn reads_env_table() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("spindletest");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nSPINDLE_MAX_RETRIES = \"5\"\n",
        )
        .unwrap();

        let map = with_xdg_home(dir.path(), || load_env_map("spindletest")).unwrap();
        assert_eq!(
            map.get("SPINDLE_MAX_RETRIES").map(String::as_str),
            Some("5")
        );
    }

    /// **Scenario**: Broken TOML surfaces a parse error.
    #[test]
    fn invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("badapp");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), "not toml [[[").unwrap();

        let result = with_xdg_home(dir.path(), || load_env_map("badapp"));
        assert!(matches!(result, Err(LoadError::XdgParse(_))));
    }

    /// **Scenario**: A config.toml without `[env]` is an empty map.
    #[test]
    fn config_without_env_section() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("noenv");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), "[other]\nkey = \"x\"\n").unwrap();

        let map = with_xdg_home(dir.path(), || load_env_map("noenv")).unwrap();
        assert!(map.is_empty());
    }
}

//! Load configuration from XDG `config.toml` and project `.env`, then apply
//! it to the process environment with priority: **existing env > .env >
//! XDG**.
//!
//! Spindle components read their limits from `SPINDLE_*` variables (see
//! `spindle::Settings::from_env`); this crate is the single place that
//! populates them from files.

mod dotenv;
mod xdg_toml;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("xdg config path: {0}")]
    XdgPath(String),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads config from XDG `config.toml` and an optional project `.env`, then
/// sets environment variables only for keys that are **not** already set.
///
/// Order of precedence when a key is missing from the process environment:
/// 1. Value from project `.env` (current directory, or `override_dir`)
/// 2. Value from `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]` table
///
/// * `app_name`: e.g. `"spindle"` — the XDG path component.
/// * `override_dir`: when `Some`, look for `.env` there instead of the
///   current directory.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg_toml::load_env_map(app_name)?;
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<&String> = xdg_map.keys().collect();
    keys.extend(dotenv_map.keys());

    for key in keys {
        if std::env::var(key).is_ok() {
            continue; // existing env wins
        }
        if let Some(value) = dotenv_map.get(key).or_else(|| xdg_map.get(key)) {
            std::env::set_var(key, value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// **Scenario**: A variable already in the environment is not replaced.
    #[test]
    fn existing_env_wins() {
        env::set_var("SPINDLE_CONFIG_TEST_EXISTING", "from_env");
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "SPINDLE_CONFIG_TEST_EXISTING=from_dotenv\n",
        )
        .unwrap();
        load_and_apply("spindle-test-app", Some(dir.path())).unwrap();
        assert_eq!(
            env::var("SPINDLE_CONFIG_TEST_EXISTING").as_deref(),
            Ok("from_env")
        );
        env::remove_var("SPINDLE_CONFIG_TEST_EXISTING");
    }

    /// **Scenario**: A `.env` value is applied when the key is unset.
    #[test]
    fn dotenv_applied_when_unset() {
        env::remove_var("SPINDLE_CONFIG_TEST_DOTENV");
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "SPINDLE_CONFIG_TEST_DOTENV=yes\n").unwrap();
        load_and_apply("spindle-test-app", Some(dir.path())).unwrap();
        assert_eq!(env::var("SPINDLE_CONFIG_TEST_DOTENV").as_deref(), Ok("yes"));
        env::remove_var("SPINDLE_CONFIG_TEST_DOTENV");
    }

    /// **Scenario**: No config anywhere is fine.
    #[test]
    fn no_config_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_and_apply("spindle-nonexistent-app-xyz", Some(dir.path())).is_ok());
    }
}

//! Bootstrap helpers for Arbiter.
//!
//! Network and contract settings can be persisted to `~/.arbiter/.env`
//! (standard dotenvy format) so the CLI works without exporting variables in
//! every shell. `ARBITER_HOME` relocates the whole directory.

use std::path::{Path, PathBuf};

/// Root directory for Arbiter state: `$ARBITER_HOME` or `~/.arbiter`.
pub fn arbiter_home() -> PathBuf {
    if let Ok(home) = std::env::var("ARBITER_HOME")
        && !home.trim().is_empty()
    {
        return PathBuf::from(home.trim());
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".arbiter")
}

/// Path to the Arbiter-specific `.env` file: `~/.arbiter/.env`.
pub fn arbiter_env_path() -> PathBuf {
    arbiter_home().join(".env")
}

/// Load env vars from `~/.arbiter/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()` so that `./.env` takes priority.
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.arbiter/.env`
pub fn load_arbiter_env() {
    let path = arbiter_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        tracing::warn!("Failed to load {}: {}", path.display(), e);
    }
}

/// Upsert bootstrap vars into `~/.arbiter/.env`, keeping unrelated keys.
pub fn save_bootstrap_env(vars: &[(&str, &str)]) -> std::io::Result<()> {
    merge_env_file(&arbiter_env_path(), vars)
}

/// Rewrite `path` with `vars` replacing same-named entries; other entries
/// keep their position. Unreadable lines are dropped.
pub fn merge_env_file(path: &Path, vars: &[(&str, &str)]) -> std::io::Result<()> {
    let mut merged: Vec<(String, String)> = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter.filter_map(Result::ok).collect(),
        Err(_) => Vec::new(),
    };
    for (key, value) in vars {
        match merged.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => merged.push((key.to_string(), value.to_string())),
        }
    }
    let borrowed: Vec<(&str, &str)> = merged
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    save_env_file(path, &borrowed)
}

/// Write vars to an env file, double-quoting values.
///
/// Backslashes and quotes are escaped so a value cannot break out of its
/// quotes and inject another variable.
pub fn save_env_file(path: &Path, vars: &[(&str, &str)]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = String::new();
    for (key, value) in vars {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        content.push_str(&format!("{}=\"{}\"\n", key, escaped));
    }
    std::fs::write(path, content)
}

use std::env;
use std::path::PathBuf;

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn resolve_home_dir() -> Option<PathBuf> {
    env::var("HOME").ok().map(PathBuf::from)
}

fn resolve_xdg_state_dir() -> Option<PathBuf> {
    if let Some(path) = normalize_env_path(env::var("XDG_STATE_HOME").ok()) {
        return Some(path);
    }
    resolve_home_dir().map(|home| home.join(".local").join("state"))
}

pub fn resolve_data_dir() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("OPSDECK_DATA_DIR").ok()) {
        return path;
    }
    if let Some(state) = resolve_xdg_state_dir() {
        return state.join("opsdeck");
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

pub fn resolve_key_path(data_dir: &std::path::Path) -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("OPSDECK_KEY_PATH").ok()) {
        return path;
    }
    data_dir.join(".opsdeck.key")
}

pub fn resolve_servers_path(data_dir: &std::path::Path) -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("OPSDECK_SERVERS_PATH").ok()) {
        return path;
    }
    data_dir.join("servers.json")
}

pub fn resolve_credentials_path(data_dir: &std::path::Path) -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("OPSDECK_CREDENTIALS_PATH").ok()) {
        return path;
    }
    data_dir.join("credentials.json")
}

pub fn resolve_audit_path(data_dir: &std::path::Path) -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("OPSDECK_AUDIT_PATH").ok()) {
        return path;
    }
    data_dir.join("audit.jsonl")
}

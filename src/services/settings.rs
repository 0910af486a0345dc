use crate::constants::pool::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_SESSIONS, DEFAULT_SWEEP_INTERVAL_SECS,
};
use crate::utils::paths::resolve_data_dir;
use std::path::PathBuf;

fn read_env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub max_sessions: usize,
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Settings {
    pub fn load() -> Self {
        Self {
            data_dir: resolve_data_dir(),
            max_sessions: read_env_number("OPSDECK_MAX_SESSIONS")
                .filter(|v: &usize| *v > 0)
                .unwrap_or(DEFAULT_MAX_SESSIONS),
            idle_timeout_secs: read_env_number("OPSDECK_IDLE_TIMEOUT_SECS")
                .filter(|v: &u64| *v > 0)
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            sweep_interval_secs: read_env_number("OPSDECK_SWEEP_INTERVAL_SECS")
                .filter(|v: &u64| *v > 0)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

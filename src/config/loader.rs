//! Config file discovery and environment overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::ConductorConfig;
use crate::error::{ConductorError, Result};

/// Source of environment variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
pub(crate) struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// `<platform config dir>/conductor/conductor.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "conductor")
        .map(|dirs| dirs.config_dir().join("conductor.toml"))
}

pub(crate) fn resolve_config_path(explicit: Option<&Path>, env: &dyn EnvSource) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env.var("CONDUCTOR_CONFIG").map(PathBuf::from))
        .or_else(default_config_path)
}

fn first(env: &dyn EnvSource, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| env.var(k))
}

fn parsed<T: FromStr>(env: &dyn EnvSource, key: &str) -> Result<Option<T>> {
    match env.var(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            ConductorError::Configuration(format!("{key} has an invalid value: {raw}"))
        }),
    }
}

pub(crate) fn apply_env_overrides(config: &mut ConductorConfig, env: &dyn EnvSource) -> Result<()> {
    if let Some(key) = first(env, &["CONDUCTOR_ORACLE_API_KEY", "OPENAI_API_KEY"]) {
        config.oracle.api_key = Some(key);
    }
    if let Some(url) = first(env, &["CONDUCTOR_ORACLE_BASE_URL", "OPENAI_BASE_URL"]) {
        config.oracle.base_url = url;
    }
    if let Some(model) = env.var("CONDUCTOR_ORACLE_MODEL") {
        config.oracle.model = model;
    }
    if let Some(secs) = parsed(env, "CONDUCTOR_ORACLE_TIMEOUT_SECS")? {
        config.oracle.timeout_secs = secs;
    }
    if let Some(url) = env.var("CONDUCTOR_TOOLS_URL") {
        config.tools.url = Some(url);
    }
    if let Some(n) = parsed(env, "CONDUCTOR_TOOLS_MAX_RETRIES")? {
        config.tools.max_retries = n;
    }
    if let Some(secs) = parsed(env, "CONDUCTOR_TOOLS_CONNECT_TIMEOUT_SECS")? {
        config.tools.connect_timeout_secs = secs;
    }
    if let Some(secs) = parsed(env, "CONDUCTOR_TOOLS_CALL_TIMEOUT_SECS")? {
        config.tools.call_timeout_secs = secs;
    }
    if let Some(n) = parsed(env, "CONDUCTOR_GRAPH_MAX_STEPS")? {
        config.graph.max_steps = n;
    }
    if let Some(secs) = parsed(env, "CONDUCTOR_GRAPH_RUN_TIMEOUT_SECS")? {
        config.graph.run_timeout_secs = secs;
    }
    Ok(())
}

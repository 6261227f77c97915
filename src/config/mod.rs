//! Configuration system (layered: defaults < TOML file < env < code).

pub mod loader;

pub use loader::{default_config_path, EnvSource};

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConductorError, Result};
use crate::util::RetryPolicy;

/// Wildcard entry in an agent's tool allow-list.
pub const ALL_TOOLS: &str = "*";

/// Top-level configuration for conductor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    pub oracle: OracleConfig,
    pub tools: ToolsConfig,
    pub graph: GraphConfig,
    pub compaction: CompactionConfig,
    pub agents: BTreeMap<String, AgentConfig>,
    pub workflows: BTreeMap<String, WorkflowConfig>,
}

/// Decision oracle endpoint.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            timeout_secs: 180,
            temperature: None,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Remote tool service connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Total attempts per call, reconnects included.
    pub max_retries: u32,
    pub connect_timeout_secs: u64,
    pub call_timeout_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_retries: 3,
            connect_timeout_secs: 10,
            call_timeout_secs: 30,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            multiplier: 2.0,
        }
    }
}

impl ToolsConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
            jitter: true,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Graph engine limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Agent executions allowed per run, across all agents.
    pub max_steps: usize,
    pub run_timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            run_timeout_secs: 300,
        }
    }
}

/// History compaction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    pub enabled: bool,
    pub keep_recent: usize,
    /// Compact once the log grows beyond this many messages.
    pub trigger_messages: usize,
    pub drop_tool_pairs: bool,
    pub summary_timeout_secs: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keep_recent: 10,
            trigger_messages: 40,
            drop_tool_pairs: true,
            summary_timeout_secs: 60,
        }
    }
}

/// Per-agent parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    /// Decision timeout; falls back to `oracle.timeout_secs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Extra decision attempts after a transport failure.
    pub decision_retries: u32,
    pub tools: Vec<String>,
    pub delegates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub enabled: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            timeout_secs: None,
            decision_retries: 1,
            tools: vec![ALL_TOOLS.to_string()],
            delegates: Vec::new(),
            instructions: None,
            model: None,
            enabled: true,
        }
    }
}

impl AgentConfig {
    pub fn decision_timeout(&self, oracle: &OracleConfig) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(oracle.timeout_secs))
    }

    pub fn allows_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t == ALL_TOOLS || t == name)
    }
}

/// Graph topology for one workflow type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub entry: String,
    pub agents: Vec<String>,
}

impl ConductorConfig {
    /// Load with the full resolution order: defaults, TOML file (explicit
    /// path, `$CONDUCTOR_CONFIG`, or the platform config dir), then env.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let env = loader::ProcessEnv;
        let mut config = match loader::resolve_config_path(path, &env) {
            Some(p) if p.exists() => Self::from_file(&p)?,
            Some(p) if path.is_some() => {
                return Err(ConductorError::Configuration(format!(
                    "config file not found: {}",
                    p.display()
                )))
            }
            _ => Self::default(),
        };
        config.apply_env(&env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `CONDUCTOR_*` (and provider fallback) environment overrides.
    pub fn apply_env(&mut self, env: &dyn EnvSource) -> Result<()> {
        loader::apply_env_overrides(self, env)
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.oracle.api_key = Some(key.into());
        self
    }

    pub fn set_tools_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.tools.url = Some(url.into());
        self
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.graph.run_timeout_secs)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ConductorError::Configuration(msg));

        if self.tools.max_retries == 0 {
            return invalid("tools.max_retries must be at least 1".into());
        }
        if self.graph.max_steps == 0 {
            return invalid("graph.max_steps must be at least 1".into());
        }
        if self.graph.run_timeout_secs == 0 || self.oracle.timeout_secs == 0 {
            return invalid("timeouts must be non-zero".into());
        }
        if self.compaction.keep_recent == 0 {
            return invalid("compaction.keep_recent must be at least 1".into());
        }
        if self.compaction.trigger_messages <= self.compaction.keep_recent {
            return invalid("compaction.trigger_messages must exceed keep_recent".into());
        }
        for (name, agent) in &self.agents {
            if agent.max_iterations == 0 {
                return invalid(format!("agents.{name}.max_iterations must be at least 1"));
            }
            if agent.delegates.iter().any(|d| d == name) {
                return invalid(format!("agents.{name} cannot delegate to itself"));
            }
        }
        for (kind, workflow) in &self.workflows {
            if !workflow.agents.contains(&workflow.entry) {
                return invalid(format!(
                    "workflows.{kind}.entry '{}' is not one of its agents",
                    workflow.entry
                ));
            }
            for member in &workflow.agents {
                let Some(agent) = self.agents.get(member) else {
                    return invalid(format!("workflows.{kind} references unknown agent '{member}'"));
                };
                if let Some(target) = agent.delegates.iter().find(|d| !workflow.agents.contains(*d)) {
                    return invalid(format!(
                        "agents.{member} delegates to '{target}' outside workflow '{kind}'"
                    ));
                }
            }
        }
        Ok(())
    }
}

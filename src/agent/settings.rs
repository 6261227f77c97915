//! Per-agent execution parameters.

use std::time::Duration;

use bon::Builder;

use crate::config::{AgentConfig, OracleConfig, ALL_TOOLS};

/// Parameters for one agent executor.
#[derive(Debug, Clone, Builder)]
pub struct AgentSettings {
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub instructions: Option<String>,
    /// Oracle calls allowed per invocation.
    #[builder(default = 10)]
    pub max_iterations: usize,
    #[builder(default = Duration::from_secs(180))]
    pub decision_timeout: Duration,
    /// Extra attempts after a decision transport failure.
    #[builder(default = 1)]
    pub decision_retries: u32,
    #[builder(default = Duration::from_millis(500))]
    pub decision_backoff: Duration,
    /// Remote tool names this agent may use; `"*"` allows all.
    #[builder(default = vec![ALL_TOOLS.to_string()])]
    pub tools: Vec<String>,
    /// Agents this one may hand control to.
    #[builder(default)]
    pub delegates: Vec<String>,
    #[builder(into)]
    pub model: Option<String>,
}

impl AgentSettings {
    pub fn from_config(name: &str, agent: &AgentConfig, oracle: &OracleConfig) -> Self {
        Self {
            name: name.to_string(),
            instructions: agent.instructions.clone(),
            max_iterations: agent.max_iterations,
            decision_timeout: agent.decision_timeout(oracle),
            decision_retries: agent.decision_retries,
            decision_backoff: Duration::from_millis(500),
            tools: agent.tools.clone(),
            delegates: agent.delegates.clone(),
            model: agent.model.clone(),
        }
    }

    pub fn allows_tool(&self, remote_name: &str) -> bool {
        self.tools.iter().any(|t| t == ALL_TOOLS || t == remote_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_config_defaults() {
        let settings = AgentSettings::builder().name("intake").build();
        let from_config =
            AgentSettings::from_config("intake", &AgentConfig::default(), &OracleConfig::default());
        assert_eq!(settings.max_iterations, from_config.max_iterations);
        assert_eq!(settings.decision_timeout, from_config.decision_timeout);
        assert_eq!(settings.decision_retries, from_config.decision_retries);
        assert!(settings.allows_tool("anything"));
    }

    #[test]
    fn allow_list_filters_tools() {
        let settings = AgentSettings::builder()
            .name("review")
            .tools(vec!["lookup".into()])
            .build();
        assert!(settings.allows_tool("lookup"));
        assert!(!settings.allows_tool("save"));
    }
}

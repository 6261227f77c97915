//! Workflow topology: an explicit name -> agent table plus an entry point.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::agent::{AgentExecutor, AgentNode, AgentSettings};
use crate::compaction::{HistoryCompactor, OracleSummarizer};
use crate::config::ConductorConfig;
use crate::error::{ConductorError, Result};
use crate::mcp::ToolClient;
use crate::oracle::DecisionOracle;

/// The agents of one workflow type.
pub struct Workflow {
    name: String,
    entry: String,
    agents: HashMap<String, Arc<dyn AgentNode>>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("agents", &self.agent_names())
            .finish()
    }
}

impl Workflow {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            entry: None,
            agents: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn agent(&self, name: &str) -> Option<&Arc<dyn AgentNode>> {
        self.agents.get(name)
    }

    pub fn agent_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Registers agents explicitly; nothing is discovered at runtime.
pub struct WorkflowBuilder {
    name: String,
    entry: Option<String>,
    agents: Vec<Arc<dyn AgentNode>>,
}

impl WorkflowBuilder {
    /// Entry agent. Defaults to the first registered agent.
    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn agent(mut self, agent: Arc<dyn AgentNode>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn build(self) -> Result<Workflow> {
        let invalid = |msg: String| ConductorError::Configuration(msg);
        let mut agents = HashMap::with_capacity(self.agents.len());
        let mut first = None;
        for agent in self.agents {
            let name = agent.name().to_string();
            first.get_or_insert_with(|| name.clone());
            if agents.insert(name.clone(), agent).is_some() {
                return Err(invalid(format!(
                    "workflow '{}' registers agent '{name}' twice",
                    self.name
                )));
            }
        }
        let entry = self
            .entry
            .or(first)
            .ok_or_else(|| invalid(format!("workflow '{}' has no agents", self.name)))?;
        if !agents.contains_key(&entry) {
            return Err(invalid(format!(
                "workflow '{}' entry '{entry}' is not registered",
                self.name
            )));
        }
        Ok(Workflow {
            name: self.name,
            entry,
            agents,
        })
    }
}

/// Process-wide collaborators handed to every agent executor.
#[derive(Clone)]
pub struct AgentDeps {
    pub oracle: Arc<dyn DecisionOracle>,
    pub tools: Option<Arc<ToolClient>>,
    pub compactor: Option<Arc<HistoryCompactor>>,
}

impl AgentDeps {
    pub fn new(oracle: Arc<dyn DecisionOracle>) -> Self {
        Self {
            oracle,
            tools: None,
            compactor: None,
        }
    }

    /// Wire the tool client, plus an oracle-backed compactor when compaction
    /// is enabled.
    pub fn from_config(
        config: &ConductorConfig,
        oracle: Arc<dyn DecisionOracle>,
        tools: Option<Arc<ToolClient>>,
    ) -> Self {
        let compactor = config.compaction.enabled.then(|| {
            let summarizer = OracleSummarizer::new(
                oracle.clone(),
                Duration::from_secs(config.compaction.summary_timeout_secs),
            );
            Arc::new(HistoryCompactor::from_config(
                Arc::new(summarizer),
                &config.compaction,
            ))
        });
        Self {
            oracle,
            tools,
            compactor,
        }
    }

    fn executor(&self, settings: AgentSettings) -> AgentExecutor {
        let mut executor = AgentExecutor::new(settings, self.oracle.clone());
        if let Some(ref tools) = self.tools {
            executor = executor.with_tools(tools.clone());
        }
        if let Some(ref compactor) = self.compactor {
            executor = executor.with_compactor(compactor.clone());
        }
        executor
    }
}

/// Build every configured workflow. Disabled agents are left out of the
/// table; delegating to one fails the run as an unknown agent.
pub fn build_workflows(
    config: &ConductorConfig,
    deps: &AgentDeps,
) -> Result<BTreeMap<String, Workflow>> {
    let mut workflows = BTreeMap::new();
    for (kind, workflow) in &config.workflows {
        let mut builder = Workflow::builder(kind).entry(&workflow.entry);
        for member in &workflow.agents {
            let agent = config
                .agents
                .get(member)
                .ok_or_else(|| ConductorError::UnknownAgent(member.clone()))?;
            if !agent.enabled {
                debug!(workflow = %kind, agent = %member, "Skipping disabled agent");
                continue;
            }
            let settings = AgentSettings::from_config(member, agent, &config.oracle);
            builder = builder.agent(Arc::new(deps.executor(settings)));
        }
        workflows.insert(kind.clone(), builder.build()?);
    }
    Ok(workflows)
}

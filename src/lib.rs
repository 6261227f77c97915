//! Conductor: multi-agent orchestration core.
//!
//! Agents consult a decision oracle, call remote tools over MCP and hand
//! control to each other through a router. Each inbound message is one run
//! of the [`graph::GraphEngine`], persisted per (workflow type, session id).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use conductor::prelude::*;
//!
//! # async fn example() -> conductor::error::Result<()> {
//! let config = ConductorConfig::load(None)?;
//! let oracle: Arc<dyn DecisionOracle> = Arc::new(OpenAiOracle::from_config(&config.oracle));
//! let deps = AgentDeps::from_config(&config, oracle, None);
//! let engine = GraphEngine::from_config(&config, &deps, Arc::new(SessionRegistry::new()))?;
//!
//! let outcome = engine.run("plan", "s1", "Help me plan a budget").await?;
//! println!("{} ({})", outcome.response, outcome.status);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod compaction;
pub mod config;
pub mod error;
pub mod graph;
pub mod mcp;
pub mod oracle;
pub mod prelude;
pub mod session;
pub mod state;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

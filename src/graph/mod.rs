//! Workflow graph: agent table, router and the run loop.

pub mod engine;
pub mod router;
pub mod workflow;

pub use engine::{GraphEngine, RunOutcome};
pub use router::{route, Route};
pub use workflow::{build_workflows, AgentDeps, Workflow, WorkflowBuilder};

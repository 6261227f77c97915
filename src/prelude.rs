//! Convenience re-exports for common use.

pub use crate::agent::{AgentExecutor, AgentNode, AgentSettings};
pub use crate::compaction::{HeuristicSummarizer, HistoryCompactor, OracleSummarizer, Summarizer};
pub use crate::config::ConductorConfig;
pub use crate::error::{ConductorError, FailureKind, Result};
pub use crate::graph::{route, AgentDeps, GraphEngine, Route, RunOutcome, Workflow};
pub use crate::mcp::{ToolClient, ToolConnector, ToolResponse, ToolSession};
pub use crate::oracle::{AgentDecision, DecisionOracle, DecisionRequest, OpenAiOracle, OracleReply};
pub use crate::session::{SessionKey, SessionRegistry};
pub use crate::state::{ExecutionStatus, SharedState};
pub use crate::types::{AgentToolCall, AgentToolResult, ContentPart, ModelMessage, Role};

#[cfg(feature = "mcp")]
pub use crate::mcp::MCPConnector;

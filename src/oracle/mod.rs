//! Decision oracle: the remote model an agent consults for its next action.

pub mod decision;
pub mod http;
pub mod openai;

pub use decision::{
    delegate_tool_definition, parse_decision, sanitize_tool_name, AgentDecision, DecisionContext,
    DELEGATE_TOOL,
};
pub use openai::OpenAiOracle;

use async_trait::async_trait;
use bon::Builder;

use crate::error::Result;
use crate::types::{AgentToolCall, ModelMessage, ToolDefinition};

/// Everything the oracle sees for one decision.
#[derive(Debug, Clone, Default, Builder)]
pub struct DecisionRequest {
    #[builder(into)]
    pub instructions: Option<String>,
    #[builder(default)]
    pub messages: Vec<ModelMessage>,
    #[builder(default)]
    pub tools: Vec<ToolDefinition>,
    /// Overrides the oracle's default model.
    #[builder(into)]
    pub model: Option<String>,
}

/// Raw oracle reply before it is mapped to an [`AgentDecision`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleReply {
    pub text: String,
    pub tool_calls: Vec<AgentToolCall>,
    pub finish_reason: Option<String>,
}

impl OracleReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![AgentToolCall {
                id: id.into(),
                name: name.into(),
                arguments,
            }],
            finish_reason: Some("tool_calls".into()),
        }
    }
}

/// Remote decision service. Implementations do not retry; callers bound
/// each call with a timeout and decide on retries.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn decide(&self, request: &DecisionRequest) -> Result<OracleReply>;
}

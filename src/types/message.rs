//! Message log entries threaded through a workflow run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the shared message log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// Agent that authored the entry, when it came from an executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ModelMessage {
    fn with_parts(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            name: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_parts(Role::System, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_parts(Role::User, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_parts(Role::Assistant, vec![ContentPart::Text { text: text.into() }])
    }

    /// Create an assistant message carrying a single tool invocation.
    pub fn tool_call(call: AgentToolCall) -> Self {
        Self::with_parts(Role::Assistant, vec![ContentPart::ToolCall(call)])
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        result: serde_json::Value,
        is_error: bool,
    ) -> Self {
        Self::with_parts(
            Role::Tool,
            vec![ContentPart::ToolResult(AgentToolResult {
                tool_call_id: tool_call_id.into(),
                result,
                is_error,
            })],
        )
    }

    /// Create a synthesized summary standing in for `summarized` older entries.
    pub fn summary(text: impl Into<String>, summarized: usize) -> Self {
        Self::with_parts(
            Role::System,
            vec![ContentPart::Summary {
                text: text.into(),
                summarized,
            }],
        )
    }

    /// Tag the message with the authoring agent.
    pub fn authored_by(mut self, agent: impl Into<String>) -> Self {
        self.name = Some(agent.into());
        self
    }

    /// Extract the text content, concatenating text and summary parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } | ContentPart::Summary { text, .. } => {
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract tool calls from this message.
    pub fn tool_calls(&self) -> Vec<&AgentToolCall> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .collect()
    }

    /// The tool result carried by this message, if any.
    pub fn tool_result_part(&self) -> Option<&AgentToolResult> {
        self.content.iter().find_map(|part| match part {
            ContentPart::ToolResult(r) => Some(r),
            _ => None,
        })
    }

    pub fn is_tool_call(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls().is_empty()
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }

    pub fn is_summary(&self) -> bool {
        self.content
            .iter()
            .any(|part| matches!(part, ContentPart::Summary { .. }))
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ToolCall(AgentToolCall),
    ToolResult(AgentToolResult),
    /// Condensed paraphrase produced by compaction. Never re-summarized.
    Summary { text: String, summarized: usize },
}

/// A tool call requested by the oracle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool execution result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolResult {
    pub tool_call_id: String,
    pub result: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

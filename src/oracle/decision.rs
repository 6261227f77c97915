//! Mapping oracle replies to agent actions.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use super::OracleReply;
use crate::error::{ConductorError, Result};
use crate::types::{AgentToolCall, SchemaBuilder, ToolDefinition};

/// Reserved tool the oracle calls to hand control to a peer agent.
pub const DELEGATE_TOOL: &str = "delegate";

/// The single action an agent takes for one decision.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentDecision {
    UseTool(AgentToolCall),
    Delegate { target: String, reason: String },
    Respond(String),
}

/// What the parser needs to know about the deciding agent.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub agent: &'a str,
    pub delegates: &'a [String],
}

/// Strip provider artifacts from a tool name: anything after `<` or `|`,
/// then every character outside `[A-Za-z0-9_-]`.
pub fn sanitize_tool_name(raw: &str) -> String {
    static INVALID: OnceLock<Option<Regex>> = OnceLock::new();
    let head = raw.split('<').next().unwrap_or_default();
    let head = head.split('|').next().unwrap_or_default().trim();
    match INVALID.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").ok()) {
        Some(re) => re.replace_all(head, "").into_owned(),
        None => head
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect(),
    }
}

/// Tool definition for [`DELEGATE_TOOL`], restricted to `targets`.
pub fn delegate_tool_definition(targets: &[String]) -> ToolDefinition {
    let schema = SchemaBuilder::new()
        .property(
            "agent_name",
            json!({
                "type": "string",
                "enum": targets,
                "description": "Agent that should take over.",
            }),
            true,
        )
        .property(
            "reason",
            json!({ "type": "string", "description": "Why control is being handed off." }),
            true,
        )
        .build();
    ToolDefinition::new(
        DELEGATE_TOOL,
        "Hand the conversation to another agent that is better suited to continue.",
        schema,
    )
}

/// Map a reply to exactly one action. Only the first tool call counts.
pub fn parse_decision(reply: &OracleReply, ctx: DecisionContext<'_>) -> Result<AgentDecision> {
    if let Some(call) = reply.tool_calls.first() {
        let name = sanitize_tool_name(&call.name);
        if name.is_empty() {
            return Err(parse_error(format!("unusable tool name {:?}", call.name)));
        }
        if reply.tool_calls.len() > 1 {
            tracing::debug!(
                agent = ctx.agent,
                requested = reply.tool_calls.len(),
                "Oracle requested several tools; executing the first"
            );
        }
        let arguments = coerce_arguments(&call.arguments)?;
        if name == DELEGATE_TOOL {
            return parse_delegation(&arguments, ctx);
        }
        let id = if call.id.trim().is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            call.id.clone()
        };
        return Ok(AgentDecision::UseTool(AgentToolCall {
            id,
            name,
            arguments,
        }));
    }

    let text = reply.text.trim();
    if text.is_empty() {
        return Err(parse_error("reply has neither text nor a tool call"));
    }
    Ok(AgentDecision::Respond(text.to_string()))
}

fn parse_delegation(arguments: &Value, ctx: DecisionContext<'_>) -> Result<AgentDecision> {
    let target = arguments
        .get("agent_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| parse_error("delegate call is missing agent_name"))?;
    if target == ctx.agent {
        return Err(parse_error(format!("agent {target} cannot delegate to itself")));
    }
    if !ctx.delegates.iter().any(|d| d == target) {
        return Err(parse_error(format!(
            "agent {} may not delegate to {target}",
            ctx.agent
        )));
    }
    let reason = arguments
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(AgentDecision::Delegate {
        target: target.to_string(),
        reason,
    })
}

/// Arguments must end up as a JSON object; string-encoded JSON is decoded.
fn coerce_arguments(raw: &Value) -> Result<Value> {
    match raw {
        Value::Null => Ok(json!({})),
        Value::Object(_) => Ok(raw.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(json!({})),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v @ Value::Object(_)) => Ok(v),
            _ => Err(parse_error("tool arguments are not a JSON object")),
        },
        _ => Err(parse_error("tool arguments are not a JSON object")),
    }
}

fn parse_error(msg: impl Into<String>) -> ConductorError {
    ConductorError::DecisionParse(msg.into())
}

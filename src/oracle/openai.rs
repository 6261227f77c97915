//! OpenAI-compatible Chat Completions oracle.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::http::{bearer_headers, shared_client, status_to_error};
use super::{DecisionOracle, DecisionRequest, OracleReply};
use crate::config::OracleConfig;
use crate::error::{ConductorError, Result};
use crate::types::{AgentToolCall, ContentPart, ModelMessage, Role};

pub struct OpenAiOracle {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f64>,
}

impl OpenAiOracle {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: None,
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        let mut oracle = Self::new(&config.base_url, config.api_key.clone(), &config.model);
        oracle.temperature = config.temperature;
        oracle
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn build_request_body(&self, request: &DecisionRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref instructions) = request.instructions {
            messages.push(json!({ "role": "system", "content": instructions }));
        }
        messages.extend(request.messages.iter().map(message_to_openai));

        let model = request.model.as_deref().unwrap_or(&self.model);
        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(temp) = self.temperature {
                obj.insert("temperature".into(), temp.into());
            }
            if !request.tools.is_empty() {
                let tool_defs: Vec<Value> = request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tool_defs.into());
                obj.insert("parallel_tool_calls".into(), false.into());
            }
        }

        body
    }
}

#[async_trait]
impl DecisionOracle for OpenAiOracle {
    fn name(&self) -> &str {
        &self.model
    }

    async fn decide(&self, request: &DecisionRequest) -> Result<OracleReply> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Oracle decision request"
        );

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(self.api_key.as_deref()))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: ChatResponse = resp.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ConductorError::DecisionParse("no choices in oracle reply".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| AgentToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::String(tc.function.arguments)),
            })
            .collect();

        Ok(OracleReply {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason: choice.finish_reason,
        })
    }
}

fn message_to_openai(msg: &ModelMessage) -> Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    if let Some(tr) = msg.tool_result_part() {
        return json!({
            "role": "tool",
            "tool_call_id": tr.tool_call_id,
            "content": tr.result.to_string(),
        });
    }

    let tool_calls = msg.tool_calls();
    if !tool_calls.is_empty() {
        let tc_json: Vec<Value> = tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": tc.arguments.to_string(),
                    }
                })
            })
            .collect();
        let text = msg.text();
        return json!({
            "role": role,
            "content": if text.is_empty() { Value::Null } else { Value::String(text) },
            "tool_calls": tc_json,
        });
    }

    if msg
        .content
        .iter()
        .any(|p| matches!(p, ContentPart::Summary { .. }))
    {
        return json!({
            "role": "system",
            "content": format!("Summary of earlier conversation:\n{}", msg.text()),
        });
    }

    json!({ "role": role, "content": msg.text() })
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Deserialize)]
struct ChatFunction {
    name: String,
    arguments: String,
}

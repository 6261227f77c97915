//! rmcp-backed connector for MCP tool services over streamable HTTP.

use async_trait::async_trait;
use rmcp::{
    model::{
        CallToolRequestParams, CallToolResult, ClientInfo, Content, JsonObject, ProtocolVersion,
        ResourceContents,
    },
    service::{ClientInitializeError, DynService, RoleClient, RunningService, ServiceError, ServiceExt},
    transport::StreamableHttpClientTransport,
};
use serde_json::Value;

use super::catalog::RemoteTool;
use super::session::{ToolConnector, ToolSession};
use crate::error::{ConductorError, Result};

type DynClientService = Box<dyn DynService<RoleClient>>;
pub type MCPRunningService = RunningService<RoleClient, DynClientService>;

/// Connects to an MCP server at a streamable HTTP endpoint.
pub struct MCPConnector {
    url: String,
}

impl MCPConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ToolConnector for MCPConnector {
    async fn connect(&self) -> Result<Box<dyn ToolSession>> {
        let transport = StreamableHttpClientTransport::from_uri(self.url.as_str());
        let client_info = ClientInfo {
            protocol_version: ProtocolVersion::LATEST,
            ..Default::default()
        };
        let service = client_info
            .into_dyn()
            .serve(transport)
            .await
            .map_err(map_client_initialize_error)?;
        Ok(Box::new(MCPSession { service: Some(service) }))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// A live rmcp client session.
pub struct MCPSession {
    service: Option<MCPRunningService>,
}

impl MCPSession {
    fn service_mut(&mut self) -> Result<&mut MCPRunningService> {
        self.service
            .as_mut()
            .ok_or_else(|| ConductorError::transport("MCP session is closed"))
    }
}

#[async_trait]
impl ToolSession for MCPSession {
    fn is_alive(&self) -> bool {
        self.service.as_ref().is_some_and(|s| !s.is_closed())
    }

    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>> {
        let service = self.service_mut()?;
        let tools = match service.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => service
                .list_tools(None)
                .await
                .map(|page| page.tools)
                .map_err(|e| map_service_error("list_tools", e))?,
            Err(e) => return Err(map_service_error("list_tools", e)),
        };
        Ok(tools.into_iter().map(map_mcp_tool_schema).collect())
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
        let arguments = coerce_tool_arguments(arguments)?;
        let result = self
            .service_mut()?
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| map_service_error(name, e))?;
        map_call_result(name, result)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(service) = self.service.take() {
            service
                .cancel()
                .await
                .map_err(|e| ConductorError::transport(format!("MCP session shutdown: {e}")))?;
        }
        Ok(())
    }
}

fn map_mcp_tool_schema(tool: rmcp::model::Tool) -> RemoteTool {
    RemoteTool {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()),
        input_schema: Value::Object((*tool.input_schema).clone()),
    }
}

fn coerce_tool_arguments(value: Value) -> Result<Option<JsonObject>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let parsed: Value = serde_json::from_str(trimmed).map_err(|e| {
                ConductorError::InvalidArgument(format!("tool arguments must be valid JSON: {e}"))
            })?;
            coerce_tool_arguments(parsed)
        }
        other => Err(ConductorError::InvalidArgument(format!(
            "tool arguments must be a JSON object; got {other}"
        ))),
    }
}

fn extract_text_content(content: &[Content]) -> Option<String> {
    let mut lines = Vec::new();
    for item in content {
        if let Some(text) = item.as_text() {
            lines.push(text.text.clone());
            continue;
        }
        if let Some(resource) = item.as_resource() {
            if let ResourceContents::TextResourceContents { text, .. } = &resource.resource {
                lines.push(text.clone());
            }
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Structured content wins; text is parsed as JSON when it is JSON.
fn map_call_result(name: &str, result: CallToolResult) -> Result<Value> {
    let text_content = extract_text_content(&result.content);

    if result.is_error.unwrap_or(false) {
        let message = result
            .structured_content
            .as_ref()
            .map(|v| v.to_string())
            .or(text_content)
            .unwrap_or_else(|| "tool returned an error result".into());
        return Err(ConductorError::ToolExecution {
            tool_name: name.to_string(),
            message,
        });
    }

    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }
    if let Some(text) = text_content {
        return Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)));
    }
    Ok(Value::Array(
        result
            .content
            .iter()
            .filter_map(|item| serde_json::to_value(item).ok())
            .collect(),
    ))
}

fn map_client_initialize_error(error: ClientInitializeError) -> ConductorError {
    match error {
        ClientInitializeError::ConnectionClosed(context) => {
            ConductorError::transport(format!("MCP initialize connection closed: {context}"))
        }
        ClientInitializeError::TransportError { error, context } => ConductorError::transport(
            format!("MCP initialize transport error ({context}): {error}"),
        ),
        ClientInitializeError::JsonRpcError(error) => ConductorError::Configuration(format!(
            "MCP initialize JSON-RPC error {}: {}",
            error.code.0, error.message
        )),
        ClientInitializeError::Cancelled => ConductorError::transport("MCP initialize cancelled"),
        other => ConductorError::transport(format!("MCP initialize error: {other}")),
    }
}

/// JSON-RPC errors are the server's answer and are final; everything else
/// is a connection fault.
fn map_service_error(context: &str, error: ServiceError) -> ConductorError {
    match error {
        ServiceError::McpError(error) => ConductorError::ToolExecution {
            tool_name: context.to_string(),
            message: format!("MCP error {}: {}", error.code.0, error.message),
        },
        ServiceError::TransportSend(error) => {
            ConductorError::transport(format!("{context}: MCP transport send failed: {error}"))
        }
        ServiceError::TransportClosed => {
            ConductorError::transport(format!("{context}: MCP transport closed"))
        }
        ServiceError::UnexpectedResponse => {
            ConductorError::transport(format!("{context}: unexpected MCP response"))
        }
        ServiceError::Cancelled { reason } => {
            let suffix = reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            ConductorError::transport(format!("{context}: MCP request cancelled{suffix}"))
        }
        ServiceError::Timeout { timeout } => ConductorError::Timeout(timeout.as_millis() as u64),
        other => ConductorError::transport(format!("{context}: MCP service error: {other}")),
    }
}

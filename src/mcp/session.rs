//! Connection seam between the tool client and a concrete tool service.

use async_trait::async_trait;
use serde_json::Value;

use super::catalog::RemoteTool;
use crate::error::Result;

/// Opens sessions to the remote tool service.
#[async_trait]
pub trait ToolConnector: Send + Sync {
    /// Establish and initialize a new session.
    async fn connect(&self) -> Result<Box<dyn ToolSession>>;

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> &str;
}

/// One live session with the tool service.
///
/// `call_tool` reports remote business failures as
/// [`ConductorError::ToolExecution`](crate::error::ConductorError::ToolExecution)
/// and connection faults as retryable errors.
#[async_trait]
pub trait ToolSession: Send {
    fn is_alive(&self) -> bool;

    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>>;

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value>;

    async fn close(&mut self) -> Result<()>;
}

//! Remote tool invocation: catalog translation, session seam and the
//! serialized tool client. The rmcp connector lives behind the `mcp` feature.

pub mod catalog;
pub mod session;
pub mod tool_client;

#[cfg(feature = "mcp")]
pub mod client;

pub use catalog::{RemoteTool, ToolCatalog};
pub use session::{ToolConnector, ToolSession};
pub use tool_client::{ToolClient, ToolFailureKind, ToolResponse};

#[cfg(feature = "mcp")]
pub use client::{MCPConnector, MCPSession};

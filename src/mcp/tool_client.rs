//! Serialized, self-healing client for the remote tool service.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use strum::Display;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::catalog::{RemoteTool, ToolCatalog};
use super::session::{ToolConnector, ToolSession};
use crate::config::ToolsConfig;
use crate::error::{ConductorError, Result};
use crate::util::{with_timeout, RetryPolicy};

/// Why a tool call did not produce data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ToolFailureKind {
    /// The service ran the tool and reported an error.
    Remote,
    /// The service could not be reached within the retry budget.
    Transient,
}

/// Structured outcome of [`ToolClient::call_tool`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponse {
    Success(Value),
    Failed {
        kind: ToolFailureKind,
        message: String,
    },
}

impl ToolResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Payload recorded as the tool result in the message log.
    pub fn into_payload(self) -> Value {
        match self {
            Self::Success(data) => json!({ "success": true, "data": data }),
            Self::Failed { kind, message } => json!({
                "success": false,
                "error": message,
                "kind": kind.to_string(),
            }),
        }
    }

    fn failed(kind: ToolFailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Default)]
struct Connection {
    session: Option<Box<dyn ToolSession>>,
    catalog: Option<ToolCatalog>,
}

impl Connection {
    async fn discard_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!(error = %e, "Ignoring error while closing stale tool session");
            }
        }
    }
}

/// Client owning the single logical connection to the tool service.
///
/// Every operation, reconnects and backoff waits included, runs inside one
/// FIFO critical section, so at most one request is in flight at a time.
pub struct ToolClient {
    connector: Arc<dyn ToolConnector>,
    connection: Mutex<Connection>,
    policy: RetryPolicy,
    connect_timeout: Duration,
    call_timeout: Duration,
}

impl ToolClient {
    pub fn new(connector: Arc<dyn ToolConnector>) -> Self {
        Self::from_config(connector, &ToolsConfig::default())
    }

    pub fn from_config(connector: Arc<dyn ToolConnector>, config: &ToolsConfig) -> Self {
        Self {
            connector,
            connection: Mutex::new(Connection::default()),
            policy: config.retry_policy(),
            connect_timeout: config.connect_timeout(),
            call_timeout: config.call_timeout(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, call: Duration) -> Self {
        self.connect_timeout = connect;
        self.call_timeout = call;
        self
    }

    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    pub async fn is_connected(&self) -> bool {
        let conn = self.connection.lock().await;
        conn.session.as_ref().is_some_and(|s| s.is_alive())
    }

    /// Invoke a tool by its oracle-facing name. Never returns an error:
    /// remote failures and exhausted retries become [`ToolResponse::Failed`].
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ToolResponse {
        let mut conn = self.connection.lock().await;
        let remote_name = conn
            .catalog
            .as_ref()
            .and_then(|c| c.resolve(name))
            .map(|t| t.name.clone())
            .unwrap_or_else(|| name.to_string());

        let attempts = self.policy.max_attempts.max(1);
        let mut last_error: Option<ConductorError> = None;
        for attempt in 0..attempts {
            let outcome = match self.ensure_session(&mut conn).await {
                Ok(session) => {
                    with_timeout(
                        self.call_timeout,
                        session.call_tool(&remote_name, arguments.clone()),
                    )
                    .await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(data) => {
                    debug!(tool = %remote_name, attempt = attempt + 1, "Tool call succeeded");
                    return ToolResponse::Success(data);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        tool = %remote_name,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "Tool call failed with transient error"
                    );
                    conn.discard_session().await;
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    }
                }
                Err(ConductorError::ToolExecution { message, .. }) => {
                    info!(tool = %remote_name, error = %message, "Tool reported an error");
                    return ToolResponse::failed(ToolFailureKind::Remote, message);
                }
                Err(e) => {
                    info!(tool = %remote_name, error = %e, "Tool call rejected");
                    return ToolResponse::failed(ToolFailureKind::Remote, e.to_string());
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt was made".into());
        ToolResponse::failed(
            ToolFailureKind::Transient,
            format!("tool service unavailable after {attempts} attempts: {detail}"),
        )
    }

    /// Fetch the remote catalog with the same reconnect policy as calls and
    /// cache its oracle-facing translation.
    pub async fn catalog(&self) -> Result<ToolCatalog> {
        let mut conn = self.connection.lock().await;
        if let Some(ref catalog) = conn.catalog {
            return Ok(catalog.clone());
        }
        let tools = self.fetch_tools(&mut conn).await?;
        let catalog = ToolCatalog::new(tools);
        conn.catalog = Some(catalog.clone());
        Ok(catalog)
    }

    /// List remote tools, bypassing the cache.
    pub async fn list_tools(&self) -> Result<Vec<RemoteTool>> {
        let mut conn = self.connection.lock().await;
        let tools = self.fetch_tools(&mut conn).await?;
        conn.catalog = Some(ToolCatalog::new(tools.clone()));
        Ok(tools)
    }

    /// Drop the live session. The next call reconnects lazily.
    pub async fn close(&self) -> Result<()> {
        let mut conn = self.connection.lock().await;
        conn.catalog = None;
        match conn.session.take() {
            Some(mut session) => {
                info!(endpoint = self.endpoint(), "Closing tool session");
                session.close().await
            }
            None => Ok(()),
        }
    }

    async fn fetch_tools(&self, conn: &mut Connection) -> Result<Vec<RemoteTool>> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let outcome = match self.ensure_session(conn).await {
                Ok(session) => with_timeout(self.call_timeout, session.list_tools()).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(tools) => return Ok(tools),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    warn!(attempt = attempt + 1, max_attempts = attempts, error = %e, "Retrying tool listing");
                    conn.discard_session().await;
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        conn.discard_session().await;
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn ensure_session<'a>(&self, conn: &'a mut Connection) -> Result<&'a mut Box<dyn ToolSession>> {
        let alive = conn.session.as_ref().is_some_and(|s| s.is_alive());
        if !alive {
            conn.discard_session().await;
            debug!(endpoint = self.endpoint(), "Connecting to tool service");
            let session = with_timeout(self.connect_timeout, self.connector.connect()).await?;
            info!(endpoint = self.endpoint(), "Tool session established");
            conn.session = Some(session);
        }
        conn.session
            .as_mut()
            .ok_or_else(|| ConductorError::transport("tool session unavailable"))
    }
}

//! Decision / tool-dispatch loop for a single agent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{AgentNode, AgentSettings};
use crate::compaction::HistoryCompactor;
use crate::error::Result;
use crate::mcp::{ToolCatalog, ToolClient, ToolFailureKind, ToolResponse};
use crate::oracle::{
    delegate_tool_definition, parse_decision, AgentDecision, DecisionContext, DecisionOracle,
    DecisionRequest,
};
use crate::state::{normalize_tool_pairing, validate_pairing, ExecutionStatus, SharedState};
use crate::types::{AgentToolCall, ModelMessage, ToolDefinition};
use crate::util::with_timeout;

/// Reply emitted when an agent exhausts its iterations or decision retries.
pub const FALLBACK_RESPONSE: &str =
    "I reached the limit of steps I can take for this request. Please rephrase or continue, and I will pick up from here.";

/// Parse failures tolerated before falling back.
const MAX_PARSE_FAILURES: u32 = 1;

/// Agent that consults the decision oracle and dispatches tools.
pub struct AgentExecutor {
    settings: AgentSettings,
    oracle: Arc<dyn DecisionOracle>,
    tools: Option<Arc<ToolClient>>,
    compactor: Option<Arc<HistoryCompactor>>,
}

impl AgentExecutor {
    pub fn new(settings: AgentSettings, oracle: Arc<dyn DecisionOracle>) -> Self {
        Self {
            settings,
            oracle,
            tools: None,
            compactor: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolClient>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_compactor(mut self, compactor: Arc<HistoryCompactor>) -> Self {
        self.compactor = Some(compactor);
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Remote catalog for this turn; an unreachable tool service leaves the
    /// agent able to respond or delegate.
    async fn load_catalog(&self) -> Option<ToolCatalog> {
        let client = self.tools.as_ref()?;
        match client.catalog().await {
            Ok(catalog) => Some(catalog),
            Err(e) => {
                warn!(agent = %self.settings.name, error = %e, "Tool catalog unavailable for this turn");
                None
            }
        }
    }

    fn tool_definitions(&self, catalog: Option<&ToolCatalog>) -> Vec<ToolDefinition> {
        let mut defs = catalog
            .map(|c| c.definitions(|remote| self.settings.allows_tool(remote)))
            .unwrap_or_default();
        if !self.settings.delegates.is_empty() {
            defs.push(delegate_tool_definition(&self.settings.delegates));
        }
        defs
    }

    fn build_request(&self, state: &SharedState, tools: &[ToolDefinition]) -> DecisionRequest {
        DecisionRequest {
            instructions: self.settings.instructions.clone(),
            messages: state.messages.clone(),
            tools: tools.to_vec(),
            model: self.settings.model.clone(),
        }
    }

    async fn dispatch_tool(&self, call: &AgentToolCall, catalog: Option<&ToolCatalog>) -> ToolResponse {
        let permitted = catalog
            .and_then(|c| c.resolve(&call.name))
            .is_some_and(|remote| self.settings.allows_tool(&remote.name));
        match (&self.tools, permitted) {
            (Some(client), true) => client.call_tool(&call.name, call.arguments.clone()).await,
            _ => ToolResponse::Failed {
                kind: ToolFailureKind::Remote,
                message: format!("tool '{}' is not available to this agent", call.name),
            },
        }
    }

    async fn prepare_log(&self, state: &mut SharedState) -> Result<()> {
        if validate_pairing(&state.messages).is_err() {
            warn!(agent = %self.settings.name, session_id = %state.session_id, "Repairing unpaired tool messages");
            state.messages = normalize_tool_pairing(&state.messages);
        }
        if let Some(ref compactor) = self.compactor {
            compactor.maybe_compact(state).await?;
        }
        Ok(())
    }

    fn finish_with_fallback(&self, state: &mut SharedState) {
        info!(
            agent = %self.settings.name,
            session_id = %state.session_id,
            iterations = state.iteration_count,
            "Emitting fallback response"
        );
        state.push(ModelMessage::assistant(FALLBACK_RESPONSE).authored_by(&self.settings.name));
        state.status = ExecutionStatus::Success;
    }
}

#[async_trait]
impl AgentNode for AgentExecutor {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn run_turn(&self, state: &mut SharedState) -> Result<()> {
        let name = self.settings.name.as_str();
        state.current_agent = Some(name.to_string());
        state.iteration_count = 0;
        state.status = ExecutionStatus::Running;

        let catalog = self.load_catalog().await;
        let tools = self.tool_definitions(catalog.as_ref());
        let ctx = DecisionContext {
            agent: name,
            delegates: &self.settings.delegates,
        };

        let mut transport_failures = 0u32;
        let mut parse_failures = 0u32;

        while state.iteration_count < self.settings.max_iterations {
            self.prepare_log(state).await?;
            let request = self.build_request(state, &tools);

            state.iteration_count += 1;
            let iteration = state.iteration_count;
            debug!(agent = name, session_id = %state.session_id, iteration, "Requesting decision");

            let reply = match with_timeout(self.settings.decision_timeout, self.oracle.decide(&request)).await {
                Ok(reply) => reply,
                Err(e) if e.is_retryable() => {
                    transport_failures += 1;
                    warn!(agent = name, iteration, attempt = transport_failures, error = %e, "Decision call failed");
                    if transport_failures > self.settings.decision_retries {
                        break;
                    }
                    tokio::time::sleep(self.settings.decision_backoff).await;
                    continue;
                }
                Err(e) => {
                    warn!(agent = name, iteration, error = %e, "Decision call rejected");
                    break;
                }
            };

            let decision = match parse_decision(&reply, ctx) {
                Ok(decision) => decision,
                Err(e) => {
                    parse_failures += 1;
                    warn!(agent = name, iteration, attempt = parse_failures, error = %e, "Unusable decision");
                    if parse_failures > MAX_PARSE_FAILURES {
                        break;
                    }
                    continue;
                }
            };

            match decision {
                AgentDecision::UseTool(call) => {
                    info!(agent = name, iteration, tool = %call.name, "Dispatching tool");
                    state.push(ModelMessage::tool_call(call.clone()).authored_by(name));
                    let response = self.dispatch_tool(&call, catalog.as_ref()).await;
                    let is_error = response.is_error();
                    state.push(
                        ModelMessage::tool_result(call.id, response.into_payload(), is_error)
                            .authored_by(name),
                    );
                }
                AgentDecision::Delegate { target, reason } => {
                    info!(agent = name, iteration, target = %target, "Delegating");
                    state.push(
                        ModelMessage::system(format!("[handoff] {name} -> {target}: {reason}"))
                            .authored_by(name),
                    );
                    state.next_agent = Some(target);
                    state.status = ExecutionStatus::Success;
                    return Ok(());
                }
                AgentDecision::Respond(text) => {
                    info!(agent = name, iteration, "Responding");
                    state.push(ModelMessage::assistant(text).authored_by(name));
                    state.status = ExecutionStatus::Success;
                    return Ok(());
                }
            }
        }

        self.finish_with_fallback(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConductorError;
    use crate::mcp::{RemoteTool, ToolConnector, ToolSession};
    use crate::oracle::{OracleReply, DELEGATE_TOOL};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct ScriptedOracle {
        replies: StdMutex<VecDeque<Result<OracleReply>>>,
        calls: AtomicUsize,
        seen_tools: StdMutex<Vec<Vec<String>>>,
    }

    impl ScriptedOracle {
        fn new(replies: Vec<Result<OracleReply>>) -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(replies.into()),
                calls: AtomicUsize::new(0),
                seen_tools: StdMutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DecisionOracle for ScriptedOracle {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn decide(&self, request: &DecisionRequest) -> Result<OracleReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_tools
                .lock()
                .unwrap()
                .push(request.tools.iter().map(|t| t.name.clone()).collect());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(OracleReply::text("done")))
        }
    }

    struct EchoSession;

    #[async_trait]
    impl ToolSession for EchoSession {
        fn is_alive(&self) -> bool {
            true
        }

        async fn list_tools(&mut self) -> Result<Vec<RemoteTool>> {
            Ok(vec![
                RemoteTool::new("lookup", "find", json!({})),
                RemoteTool::new("save", "persist", json!({})),
            ])
        }

        async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
            Ok(json!({ "tool": name, "args": arguments }))
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct EchoConnector;

    #[async_trait]
    impl ToolConnector for EchoConnector {
        async fn connect(&self) -> Result<Box<dyn ToolSession>> {
            Ok(Box::new(EchoSession))
        }

        fn endpoint(&self) -> &str {
            "echo"
        }
    }

    fn executor(oracle: Arc<ScriptedOracle>, max_iterations: usize) -> AgentExecutor {
        let settings = AgentSettings::builder()
            .name("intake")
            .max_iterations(max_iterations)
            .delegates(vec!["next_agent".into()])
            .build();
        AgentExecutor::new(settings, oracle).with_tools(Arc::new(ToolClient::new(Arc::new(EchoConnector))))
    }

    fn user_state() -> SharedState {
        let mut state = SharedState::new("s1");
        state.push(ModelMessage::user("plan my loan"));
        state
    }

    #[tokio::test]
    async fn tool_then_delegate_yields_four_messages() {
        let oracle = ScriptedOracle::new(vec![
            Ok(OracleReply::tool_call("c1", "lookup", json!({}))),
            Ok(OracleReply::tool_call(
                "c2",
                DELEGATE_TOOL,
                json!({"agent_name": "next_agent", "reason": "ready"}),
            )),
        ]);
        let agent = executor(oracle.clone(), 3);
        let mut state = user_state();
        agent.run_turn(&mut state).await.unwrap();

        assert_eq!(state.status, ExecutionStatus::Success);
        assert_eq!(state.next_agent.as_deref(), Some("next_agent"));
        assert_eq!(state.messages.len(), 4);
        assert!(state.messages[1].is_tool_call());
        let result = state.messages[2].tool_result_part().unwrap();
        assert_eq!(result.tool_call_id, "c1");
        assert!(!result.is_error);
        assert_eq!(result.result["data"]["tool"], "lookup");
        assert_eq!(oracle.calls(), 2);
        assert!(state.iteration_count <= 3);
    }

    #[tokio::test]
    async fn never_deciding_hits_fallback_without_extra_call() {
        let replies = (0..10)
            .map(|i| Ok(OracleReply::tool_call(format!("c{i}"), "lookup", json!({}))))
            .collect();
        let oracle = ScriptedOracle::new(replies);
        let agent = executor(oracle.clone(), 5);
        let mut state = user_state();
        agent.run_turn(&mut state).await.unwrap();

        assert_eq!(oracle.calls(), 5);
        assert_eq!(state.iteration_count, 5);
        assert_eq!(state.status, ExecutionStatus::Success);
        assert_eq!(state.last_response().as_deref(), Some(FALLBACK_RESPONSE));
        assert!(validate_pairing(&state.messages).is_ok());
    }

    #[tokio::test]
    async fn repeated_parse_failure_falls_back() {
        let oracle = ScriptedOracle::new(vec![
            Ok(OracleReply::text("")),
            Ok(OracleReply::text("  ")),
            Ok(OracleReply::text("never reached")),
        ]);
        let agent = executor(oracle.clone(), 5);
        let mut state = user_state();
        agent.run_turn(&mut state).await.unwrap();
        assert_eq!(oracle.calls(), 2);
        assert_eq!(state.last_response().as_deref(), Some(FALLBACK_RESPONSE));
    }

    #[tokio::test]
    async fn single_parse_failure_is_retried() {
        let oracle = ScriptedOracle::new(vec![Ok(OracleReply::text("")), Ok(OracleReply::text("Hello"))]);
        let agent = executor(oracle.clone(), 5);
        let mut state = user_state();
        agent.run_turn(&mut state).await.unwrap();
        assert_eq!(state.last_response().as_deref(), Some("Hello"));
        assert_eq!(state.messages.last().unwrap().name.as_deref(), Some("intake"));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_retry_then_fall_back() {
        let oracle = ScriptedOracle::new(vec![
            Err(ConductorError::Timeout(180_000)),
            Err(ConductorError::transport("reset")),
            Ok(OracleReply::text("never reached")),
        ]);
        let agent = executor(oracle.clone(), 5);
        let mut state = user_state();
        agent.run_turn(&mut state).await.unwrap();
        assert_eq!(oracle.calls(), 2);
        assert_eq!(state.status, ExecutionStatus::Success);
        assert_eq!(state.last_response().as_deref(), Some(FALLBACK_RESPONSE));
    }

    #[tokio::test]
    async fn disallowed_tool_is_reported_back_to_oracle() {
        let oracle = ScriptedOracle::new(vec![
            Ok(OracleReply::tool_call("c1", "save", json!({}))),
            Ok(OracleReply::text("ok")),
        ]);
        let settings = AgentSettings::builder()
            .name("review")
            .tools(vec!["lookup".into()])
            .build();
        let agent = AgentExecutor::new(settings, oracle.clone())
            .with_tools(Arc::new(ToolClient::new(Arc::new(EchoConnector))));
        let mut state = user_state();
        agent.run_turn(&mut state).await.unwrap();

        let result = state.messages[2].tool_result_part().unwrap();
        assert!(result.is_error);
        assert_eq!(result.result["kind"], "remote");
        assert_eq!(oracle.seen_tools.lock().unwrap()[0], vec!["lookup".to_string()]);
    }

    #[tokio::test]
    async fn delegate_tool_is_offered_only_with_delegates() {
        let oracle = ScriptedOracle::new(vec![]);
        let agent = executor(oracle.clone(), 2);
        agent.run_turn(&mut user_state()).await.unwrap();
        let offered = oracle.seen_tools.lock().unwrap()[0].clone();
        assert_eq!(offered, vec!["lookup", "save", DELEGATE_TOOL]);
    }

    #[tokio::test]
    async fn dangling_history_is_repaired_before_deciding() {
        let oracle = ScriptedOracle::new(vec![Ok(OracleReply::text("fine"))]);
        let agent = executor(oracle, 2);
        let mut state = user_state();
        state.push(ModelMessage::tool_call(AgentToolCall {
            id: "old".into(),
            name: "lookup".into(),
            arguments: json!({}),
        }));
        agent.run_turn(&mut state).await.unwrap();
        assert!(validate_pairing(&state.messages).is_ok());
        assert_eq!(state.messages.len(), 4);
    }
}

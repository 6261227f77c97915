//! Shared test helpers: scripted oracle and in-memory tool service.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use conductor::agent::{AgentExecutor, AgentSettings};
use conductor::compaction::HistoryCompactor;
use conductor::error::{ConductorError, Result};
use conductor::graph::{GraphEngine, Workflow};
use conductor::mcp::{RemoteTool, ToolClient, ToolConnector, ToolSession};
use conductor::oracle::{DecisionOracle, DecisionRequest, OracleReply, DELEGATE_TOOL};
use conductor::session::SessionRegistry;
use conductor::util::RetryPolicy;

/// Oracle that replays queued replies, then answers "done".
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<OracleReply>>>,
    calls: AtomicUsize,
    delay: Duration,
    seen_lengths: Mutex<Vec<usize>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<Result<OracleReply>>) -> Arc<Self> {
        Self::with_delay(replies, Duration::ZERO)
    }

    pub fn with_delay(replies: Vec<Result<OracleReply>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            delay,
            seen_lengths: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, reply: Result<OracleReply>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Message count of every request received, in order.
    pub fn seen_lengths(&self) -> Vec<usize> {
        self.seen_lengths.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, request: &DecisionRequest) -> Result<OracleReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_lengths.lock().unwrap().push(request.messages.len());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(OracleReply::text("done")))
    }
}

pub fn use_tool(id: &str, name: &str, args: Value) -> Result<OracleReply> {
    Ok(OracleReply::tool_call(id, name, args))
}

pub fn delegate(id: &str, target: &str) -> Result<OracleReply> {
    Ok(OracleReply::tool_call(
        id,
        DELEGATE_TOOL,
        json!({ "agent_name": target, "reason": "handing off" }),
    ))
}

pub fn respond(text: &str) -> Result<OracleReply> {
    Ok(OracleReply::text(text))
}

/// In-memory tool service. `lookup` echoes, `fail` reports a business error.
#[derive(Default)]
pub struct MockToolService {
    connects: AtomicUsize,
    calls: AtomicUsize,
    connect_failures: AtomicUsize,
    call_drops: AtomicUsize,
    call_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    last_alive: Mutex<Option<Arc<AtomicBool>>>,
}

impl MockToolService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` connection attempts.
    pub fn fail_connects(&self, n: usize) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Drop the connection on the next `n` calls.
    pub fn drop_calls(&self, n: usize) {
        self.call_drops.store(n, Ordering::SeqCst);
    }

    /// Hold every call open for `delay` before answering.
    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock().unwrap() = delay;
    }

    /// Highest number of calls ever executing at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Simulate the server closing the live session.
    pub fn kill_session(&self) {
        if let Some(alive) = self.last_alive.lock().unwrap().as_ref() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct MockConnector(pub Arc<MockToolService>);

#[async_trait]
impl ToolConnector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn ToolSession>> {
        let service = self.0.clone();
        service.connects.fetch_add(1, Ordering::SeqCst);
        if MockToolService::take(&service.connect_failures) {
            return Err(ConductorError::transport("connection refused"));
        }
        let alive = Arc::new(AtomicBool::new(true));
        *service.last_alive.lock().unwrap() = Some(alive.clone());
        Ok(Box::new(MockSession { service, alive }))
    }

    fn endpoint(&self) -> &str {
        "mock://tools"
    }
}

struct MockSession {
    service: Arc<MockToolService>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl ToolSession for MockSession {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>> {
        Ok(vec![
            RemoteTool::new(
                "lookup",
                "Look up a customer record",
                json!({"type": "object", "properties": {"id": {"type": "string"}}}),
            ),
            RemoteTool::new("fail", "Always reports an error", json!({"type": "object"})),
        ])
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
        let service = &self.service;
        service.calls.fetch_add(1, Ordering::SeqCst);
        let now = service.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        service.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *service.call_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self.answer(name, arguments);
        self.service.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn close(&mut self) -> Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl MockSession {
    fn answer(&self, name: &str, arguments: Value) -> Result<Value> {
        if MockToolService::take(&self.service.call_drops) {
            self.alive.store(false, Ordering::SeqCst);
            return Err(ConductorError::transport("connection reset"));
        }
        match name {
            "fail" => Err(ConductorError::ToolExecution {
                tool_name: name.into(),
                message: "record not found".into(),
            }),
            _ => Ok(json!({ "tool": name, "echo": arguments })),
        }
    }
}

/// Tool client over the mock service with zero backoff.
pub fn tool_client(service: &Arc<MockToolService>) -> Arc<ToolClient> {
    Arc::new(
        ToolClient::new(Arc::new(MockConnector(service.clone())))
            .with_retry_policy(RetryPolicy::immediate(3)),
    )
}

pub fn executor(
    name: &str,
    max_iterations: usize,
    delegates: &[&str],
    oracle: Arc<ScriptedOracle>,
    tools: Option<Arc<ToolClient>>,
    compactor: Option<Arc<HistoryCompactor>>,
) -> Arc<AgentExecutor> {
    let settings = AgentSettings::builder()
        .name(name)
        .max_iterations(max_iterations)
        .decision_backoff(Duration::ZERO)
        .delegates(delegates.iter().map(|d| d.to_string()).collect())
        .build();
    let mut agent = AgentExecutor::new(settings, oracle);
    if let Some(tools) = tools {
        agent = agent.with_tools(tools);
    }
    if let Some(compactor) = compactor {
        agent = agent.with_compactor(compactor);
    }
    Arc::new(agent)
}

/// `intake` (may delegate to `review`) and `review`, sharing one oracle.
pub fn plan_workflow(
    kind: &str,
    oracle: Arc<ScriptedOracle>,
    tools: Option<Arc<ToolClient>>,
    compactor: Option<Arc<HistoryCompactor>>,
) -> Workflow {
    Workflow::builder(kind)
        .entry("intake")
        .agent(executor("intake", 5, &["review"], oracle.clone(), tools.clone(), compactor.clone()))
        .agent(executor("review", 5, &[], oracle, tools, compactor))
        .build()
        .unwrap()
}

pub fn engine(workflows: Vec<Workflow>) -> GraphEngine {
    workflows
        .into_iter()
        .fold(GraphEngine::new(Arc::new(SessionRegistry::new())), |engine, w| {
            engine.with_workflow(w)
        })
}

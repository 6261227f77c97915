//! Runs one inbound message through a workflow and persists the result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::router::{route, Route};
use super::workflow::{build_workflows, AgentDeps, Workflow};
use crate::config::ConductorConfig;
use crate::error::{ConductorError, FailureKind, Result};
use crate::session::SessionRegistry;
use crate::state::{validate_pairing, ExecutionStatus, SharedState};
use crate::types::ModelMessage;
use crate::util::with_timeout;

const DEFAULT_MAX_STEPS: usize = 25;
const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// What the caller of [`GraphEngine::run`] gets back.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub response: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Agent turns executed in this run.
    pub steps: usize,
    /// The persisted checkpoint after this run. On failure this is the
    /// previous checkpoint, untouched.
    #[serde(skip)]
    pub state: SharedState,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Drives agents and the router for each inbound message.
pub struct GraphEngine {
    workflows: BTreeMap<String, Arc<Workflow>>,
    sessions: Arc<SessionRegistry>,
    max_steps: usize,
    run_timeout: Duration,
    shutdown: CancellationToken,
}

impl GraphEngine {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            workflows: BTreeMap::new(),
            sessions,
            max_steps: DEFAULT_MAX_STEPS,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    /// Engine with every configured workflow and the configured limits.
    pub fn from_config(
        config: &ConductorConfig,
        deps: &AgentDeps,
        sessions: Arc<SessionRegistry>,
    ) -> Result<Self> {
        let mut engine = Self::new(sessions).with_limits(config.graph.max_steps, config.run_timeout());
        for workflow in build_workflows(config, deps)?.into_values() {
            engine = engine.with_workflow(workflow);
        }
        Ok(engine)
    }

    pub fn with_workflow(mut self, workflow: Workflow) -> Self {
        self.workflows
            .insert(workflow.name().to_string(), Arc::new(workflow));
        self
    }

    pub fn with_limits(mut self, max_steps: usize, run_timeout: Duration) -> Self {
        self.max_steps = max_steps.max(1);
        self.run_timeout = run_timeout;
        self
    }

    /// Share a cancellation token with the host; cancelling it aborts
    /// in-flight runs without committing them.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn workflow_types(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    pub fn workflow(&self, workflow_type: &str) -> Option<&Arc<Workflow>> {
        self.workflows.get(workflow_type)
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Process one message for `(workflow_type, session_id)`.
    ///
    /// Runs for the same pair are serialized. A run that fails, times out,
    /// exceeds the step limit or is cancelled commits nothing and reports
    /// FAILED with a user-facing message; the session stays usable.
    pub async fn run(
        &self,
        workflow_type: &str,
        session_id: &str,
        message: impl Into<String>,
    ) -> Result<RunOutcome> {
        let workflow = self
            .workflows
            .get(workflow_type)
            .cloned()
            .ok_or_else(|| ConductorError::UnknownWorkflow(workflow_type.to_string()))?;

        let slot = self.sessions.slot(workflow_type, session_id).await;
        let mut guard = slot.lock().await;

        let mut state = guard.state().clone();
        state.begin_run();
        state.push(ModelMessage::user(message));
        debug!(
            workflow = workflow_type,
            session_id,
            messages = state.messages.len(),
            "Starting run"
        );

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => Err(ConductorError::Cancelled),
            result = with_timeout(self.run_timeout, self.drive(&workflow, &mut state)) => result,
        };
        let result = result.and_then(|steps| {
            validate_pairing(&state.messages)?;
            Ok(steps)
        });

        match result {
            Ok(steps) => {
                let response = state.last_response().unwrap_or_default();
                info!(
                    workflow = workflow_type,
                    session_id,
                    steps,
                    messages = state.messages.len(),
                    "Run completed"
                );
                guard.commit(state.clone()).await;
                Ok(RunOutcome {
                    response,
                    status: state.status,
                    failure: state.failure,
                    steps,
                    state,
                })
            }
            Err(e) => {
                let kind = e.failure_kind();
                warn!(
                    workflow = workflow_type,
                    session_id,
                    error = %e,
                    failure = %kind,
                    "Run failed; checkpoint left unchanged"
                );
                Ok(RunOutcome {
                    response: kind.user_message().to_string(),
                    status: ExecutionStatus::Failed,
                    failure: Some(kind),
                    steps: 0,
                    state: guard.state().clone(),
                })
            }
        }
    }

    /// Entry agent, then whatever the router names, until it says end.
    async fn drive(&self, workflow: &Workflow, state: &mut SharedState) -> Result<usize> {
        let mut current = workflow.entry().to_string();
        let mut steps = 0;
        loop {
            if steps >= self.max_steps {
                return Err(ConductorError::StepLimitExceeded {
                    limit: self.max_steps,
                });
            }
            let agent = workflow
                .agent(&current)
                .ok_or_else(|| ConductorError::UnknownAgent(current.clone()))?;
            steps += 1;
            debug!(workflow = workflow.name(), agent = %current, step = steps, "Running agent");
            agent.run_turn(state).await?;

            match route(state) {
                Route::Agent(next) => {
                    state.take_next_agent();
                    state.status = ExecutionStatus::Running;
                    debug!(from = %current, to = %next, "Handing off");
                    current = next;
                }
                Route::End => return Ok(steps),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentNode;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Agent that always hands off to a fixed peer.
    struct PingPong {
        name: &'static str,
        peer: &'static str,
    }

    #[async_trait]
    impl AgentNode for PingPong {
        fn name(&self) -> &str {
            self.name
        }

        async fn run_turn(&self, state: &mut SharedState) -> Result<()> {
            state.push(ModelMessage::assistant(format!("{} turn", self.name)).authored_by(self.name));
            state.next_agent = Some(self.peer.to_string());
            state.status = ExecutionStatus::Success;
            Ok(())
        }
    }

    struct Answer(&'static str);

    #[async_trait]
    impl AgentNode for Answer {
        fn name(&self) -> &str {
            self.0
        }

        async fn run_turn(&self, state: &mut SharedState) -> Result<()> {
            state.push(ModelMessage::assistant("answer").authored_by(self.0));
            state.status = ExecutionStatus::Success;
            Ok(())
        }
    }

    struct Stall;

    #[async_trait]
    impl AgentNode for Stall {
        fn name(&self) -> &str {
            "stall"
        }

        async fn run_turn(&self, state: &mut SharedState) -> Result<()> {
            state.push(ModelMessage::assistant("thinking"));
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn ping_pong_engine(max_steps: usize) -> GraphEngine {
        let workflow = Workflow::builder("plan")
            .agent(Arc::new(PingPong { name: "a", peer: "b" }))
            .agent(Arc::new(PingPong { name: "b", peer: "a" }))
            .build()
            .unwrap();
        GraphEngine::new(Arc::new(SessionRegistry::new()))
            .with_limits(max_steps, Duration::from_secs(60))
            .with_workflow(workflow)
    }

    #[tokio::test]
    async fn delegation_chain_ends_on_terminal_agent() {
        let workflow = Workflow::builder("plan")
            .agent(Arc::new(PingPong { name: "intake", peer: "review" }))
            .agent(Arc::new(Answer("review")))
            .build()
            .unwrap();
        let engine = GraphEngine::new(Arc::new(SessionRegistry::new())).with_workflow(workflow);

        let outcome = engine.run("plan", "s1", "hello").await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.response, "answer");
        assert!(outcome.state.next_agent.is_none());

        let saved = engine.sessions().export("plan", "s1").await.unwrap();
        assert_eq!(saved.messages.len(), 3);
    }

    #[tokio::test]
    async fn ping_pong_hits_step_limit_and_commits_nothing() {
        let engine = ping_pong_engine(4);
        let outcome = engine.run("plan", "s1", "hello").await.unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.failure, Some(FailureKind::StepLimit));
        assert_eq!(outcome.response, FailureKind::StepLimit.user_message());
        assert!(outcome.state.messages.is_empty());
        assert!(engine.sessions().export("plan", "s1").await.unwrap().messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_timeout_fails_without_commit() {
        let workflow = Workflow::builder("plan").agent(Arc::new(Stall)).build().unwrap();
        let engine = GraphEngine::new(Arc::new(SessionRegistry::new()))
            .with_limits(5, Duration::from_secs(5))
            .with_workflow(workflow);
        let outcome = engine.run("plan", "s1", "hello").await.unwrap();
        assert_eq!(outcome.failure, Some(FailureKind::Timeout));
        assert!(engine.sessions().export("plan", "s1").await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn cancelled_engine_fails_runs() {
        let workflow = Workflow::builder("plan").agent(Arc::new(Stall)).build().unwrap();
        let token = CancellationToken::new();
        let engine = GraphEngine::new(Arc::new(SessionRegistry::new()))
            .with_shutdown(token.clone())
            .with_workflow(workflow);
        token.cancel();
        let outcome = engine.run("plan", "s1", "hello").await.unwrap();
        assert_eq!(outcome.failure, Some(FailureKind::Internal));
    }

    #[tokio::test]
    async fn unknown_workflow_is_an_error_and_creates_no_session() {
        let engine = ping_pong_engine(4);
        let err = engine.run("ghost", "s1", "hello").await.unwrap_err();
        assert!(matches!(err, ConductorError::UnknownWorkflow(_)));
        assert!(engine.sessions().list().await.is_empty());
    }

    #[tokio::test]
    async fn delegation_to_unregistered_agent_fails_the_run() {
        let workflow = Workflow::builder("plan")
            .agent(Arc::new(PingPong { name: "a", peer: "ghost" }))
            .build()
            .unwrap();
        let engine = GraphEngine::new(Arc::new(SessionRegistry::new())).with_workflow(workflow);
        let outcome = engine.run("plan", "s1", "hello").await.unwrap();
        assert_eq!(outcome.failure, Some(FailureKind::Internal));
    }

    /// Fails its first turn, answers afterwards.
    struct Flaky(AtomicUsize);

    #[async_trait]
    impl AgentNode for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run_turn(&self, state: &mut SharedState) -> Result<()> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                state.push(ModelMessage::assistant("half done"));
                return Err(ConductorError::InvalidState("boom".into()));
            }
            state.push(ModelMessage::assistant("recovered"));
            state.status = ExecutionStatus::Success;
            Ok(())
        }
    }

    #[tokio::test]
    async fn session_stays_usable_after_failure() {
        let workflow = Workflow::builder("plan")
            .agent(Arc::new(Flaky(AtomicUsize::new(0))))
            .build()
            .unwrap();
        let engine = GraphEngine::new(Arc::new(SessionRegistry::new())).with_workflow(workflow);

        let first = engine.run("plan", "s1", "one").await.unwrap();
        assert_eq!(first.failure, Some(FailureKind::Internal));
        assert!(!first.response.contains("boom"));

        let second = engine.run("plan", "s1", "two").await.unwrap();
        assert!(second.is_success());
        assert_eq!(second.response, "recovered");
        assert_eq!(second.state.messages.len(), 2);
        assert_eq!(second.state.messages[0].text(), "two");
    }
}

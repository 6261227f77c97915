//! In-memory checkpoint store keyed by (workflow type, session id).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

use super::checkpoint::{Checkpoint, SessionInfo, SessionKey};
use crate::state::SharedState;

/// One session's checkpoint plus the lock that serializes its runs.
pub struct SessionSlot {
    key: SessionKey,
    checkpoint: Mutex<Checkpoint>,
    summary: RwLock<SessionInfo>,
}

impl SessionSlot {
    fn new(key: SessionKey) -> Self {
        let checkpoint = Checkpoint::new(&key.session_id);
        let summary = SessionInfo::from_checkpoint(key.clone(), &checkpoint);
        Self {
            key,
            checkpoint: Mutex::new(checkpoint),
            summary: RwLock::new(summary),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Acquire the run lock. Waiters are served in arrival order.
    pub async fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            slot: self,
            checkpoint: self.checkpoint.lock().await,
        }
    }

    async fn info(&self) -> SessionInfo {
        let mut info = self.summary.read().await.clone();
        info.in_flight = self.checkpoint.try_lock().is_err();
        info
    }
}

/// Exclusive access to a session for the duration of one run.
pub struct SessionGuard<'a> {
    slot: &'a SessionSlot,
    checkpoint: MutexGuard<'a, Checkpoint>,
}

impl SessionGuard<'_> {
    /// Last persisted state.
    pub fn state(&self) -> &SharedState {
        &self.checkpoint.state
    }

    pub fn runs(&self) -> u64 {
        self.checkpoint.runs
    }

    /// Persist the outcome of a completed run.
    pub async fn commit(&mut self, state: SharedState) {
        self.checkpoint.commit(state);
        let summary = SessionInfo::from_checkpoint(self.slot.key.clone(), &self.checkpoint);
        *self.slot.summary.write().await = summary;
    }
}

/// Aggregate registry counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistryStats {
    pub workflow_types: usize,
    pub sessions: usize,
    pub messages: usize,
    pub sessions_per_workflow: BTreeMap<String, usize>,
}

type SessionMap = HashMap<String, Arc<SessionSlot>>;

/// Nested mapping workflow type -> session id -> slot.
#[derive(Default)]
pub struct SessionRegistry {
    workflows: RwLock<HashMap<String, SessionMap>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for the pair, created empty on first use.
    pub async fn slot(&self, workflow_type: &str, session_id: &str) -> Arc<SessionSlot> {
        if let Some(slot) = self.get(workflow_type, session_id).await {
            return slot;
        }
        let mut workflows = self.workflows.write().await;
        workflows
            .entry(workflow_type.to_string())
            .or_default()
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(workflow = workflow_type, session_id, "Creating checkpoint");
                Arc::new(SessionSlot::new(SessionKey::new(workflow_type, session_id)))
            })
            .clone()
    }

    pub async fn get(&self, workflow_type: &str, session_id: &str) -> Option<Arc<SessionSlot>> {
        self.workflows
            .read()
            .await
            .get(workflow_type)
            .and_then(|sessions| sessions.get(session_id))
            .cloned()
    }

    pub async fn contains(&self, workflow_type: &str, session_id: &str) -> bool {
        self.get(workflow_type, session_id).await.is_some()
    }

    /// Every registered pair, sorted.
    pub async fn list(&self) -> Vec<SessionKey> {
        let workflows = self.workflows.read().await;
        let mut keys: Vec<SessionKey> = workflows
            .iter()
            .flat_map(|(kind, sessions)| sessions.keys().map(move |id| SessionKey::new(kind, id)))
            .collect();
        keys.sort();
        keys
    }

    fn slots_snapshot(workflows: &HashMap<String, SessionMap>) -> Vec<Arc<SessionSlot>> {
        workflows
            .values()
            .flat_map(|sessions| sessions.values().cloned())
            .collect()
    }

    /// Details for every session without waiting on in-flight runs.
    pub async fn list_info(&self) -> Vec<SessionInfo> {
        let slots = Self::slots_snapshot(&*self.workflows.read().await);
        let mut infos = join_all(slots.iter().map(|slot| slot.info())).await;
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    pub async fn info(&self, workflow_type: &str, session_id: &str) -> Option<SessionInfo> {
        let slot = self.get(workflow_type, session_id).await?;
        Some(slot.info().await)
    }

    /// Copy of the persisted state. Waits for an in-flight run to finish.
    pub async fn export(&self, workflow_type: &str, session_id: &str) -> Option<SharedState> {
        let slot = self.get(workflow_type, session_id).await?;
        let guard = slot.lock().await;
        Some(guard.state().clone())
    }

    /// Remove one pair. A run already holding the slot finishes against the
    /// detached checkpoint.
    pub async fn evict(&self, workflow_type: &str, session_id: &str) -> bool {
        let mut workflows = self.workflows.write().await;
        let Some(sessions) = workflows.get_mut(workflow_type) else {
            return false;
        };
        let removed = sessions.remove(session_id).is_some();
        if sessions.is_empty() {
            workflows.remove(workflow_type);
        }
        if removed {
            info!(workflow = workflow_type, session_id, "Evicted session");
        }
        removed
    }

    /// Remove every session of one workflow type.
    pub async fn evict_workflow(&self, workflow_type: &str) -> usize {
        let removed = self
            .workflows
            .write()
            .await
            .remove(workflow_type)
            .map(|sessions| sessions.len())
            .unwrap_or(0);
        if removed > 0 {
            info!(workflow = workflow_type, removed, "Evicted workflow sessions");
        }
        removed
    }

    /// Remove a session id under every workflow type.
    pub async fn evict_session(&self, session_id: &str) -> usize {
        let mut workflows = self.workflows.write().await;
        let mut removed = 0;
        for sessions in workflows.values_mut() {
            removed += usize::from(sessions.remove(session_id).is_some());
        }
        workflows.retain(|_, sessions| !sessions.is_empty());
        removed
    }

    pub async fn stats(&self) -> RegistryStats {
        let (sessions_per_workflow, slots) = {
            let workflows = self.workflows.read().await;
            let per: BTreeMap<String, usize> = workflows
                .iter()
                .map(|(kind, sessions)| (kind.clone(), sessions.len()))
                .collect();
            (per, Self::slots_snapshot(&workflows))
        };
        let mut messages = 0;
        for slot in &slots {
            messages += slot.summary.read().await.message_count;
        }
        RegistryStats {
            workflow_types: sessions_per_workflow.len(),
            sessions: slots.len(),
            messages,
            sessions_per_workflow,
        }
    }
}

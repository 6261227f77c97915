//! Routing between agents after each turn.

use std::fmt;

use tracing::debug;

use crate::state::SharedState;

/// Where control goes after an agent turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Hand control to the named agent.
    Agent(String),
    /// The run is over.
    End,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(name) => f.write_str(name),
            Self::End => f.write_str("__end__"),
        }
    }
}

/// Pick the next node from the state alone.
///
/// A pending delegation wins over every status. Clearing `next_agent` is
/// left to the engine (`SharedState::take_next_agent`) so that repeated
/// calls on the same state agree.
pub fn route(state: &SharedState) -> Route {
    if let Some(ref next) = state.next_agent {
        return Route::Agent(next.clone());
    }
    if !state.status.is_terminal() {
        debug!(session_id = %state.session_id, "Routing a non-terminal state to end");
    }
    Route::End
}

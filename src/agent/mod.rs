//! Agents: named execution units composed by the graph engine.

pub mod executor;
pub mod settings;

pub use executor::{AgentExecutor, FALLBACK_RESPONSE};
pub use settings::AgentSettings;

use async_trait::async_trait;

use crate::error::Result;
use crate::state::SharedState;

/// One turn of control for a named agent.
///
/// On `Ok` the state is either terminal or carries a delegation target.
#[async_trait]
pub trait AgentNode: Send + Sync {
    fn name(&self) -> &str;

    async fn run_turn(&self, state: &mut SharedState) -> Result<()>;
}

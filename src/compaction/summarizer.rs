//! Summary generation for compacted history runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{ConductorError, Result};
use crate::oracle::{DecisionOracle, DecisionRequest};
use crate::types::{ModelMessage, Role};
use crate::util::with_timeout;

/// Produces the condensed paraphrase for a run of messages.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[ModelMessage]) -> Result<String>;
}

/// Deterministic, offline summary: one clipped line per message.
#[derive(Debug, Clone)]
pub struct HeuristicSummarizer {
    pub max_chars_per_message: usize,
}

impl Default for HeuristicSummarizer {
    fn default() -> Self {
        Self {
            max_chars_per_message: 160,
        }
    }
}

impl HeuristicSummarizer {
    fn line(&self, message: &ModelMessage) -> String {
        let who = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let text = message.text();
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let clipped: String = text.chars().take(self.max_chars_per_message).collect();
        if clipped.len() < text.len() {
            format!("- {who}: {clipped}...")
        } else {
            format!("- {who}: {clipped}")
        }
    }
}

#[async_trait]
impl Summarizer for HeuristicSummarizer {
    async fn summarize(&self, messages: &[ModelMessage]) -> Result<String> {
        let mut out = format!("{} earlier messages:", messages.len());
        for message in messages {
            out.push('\n');
            out.push_str(&self.line(message));
        }
        Ok(out)
    }
}

const SUMMARY_INSTRUCTIONS: &str = "Summarize the conversation excerpt below in a few sentences. \
Keep names, figures, decisions and open questions. Reply with the summary only.";

/// Asks the decision oracle for the paraphrase under its own deadline and
/// falls back to [`HeuristicSummarizer`] on any failure. Never retries.
pub struct OracleSummarizer {
    oracle: Arc<dyn DecisionOracle>,
    timeout: Duration,
    fallback: HeuristicSummarizer,
}

impl OracleSummarizer {
    pub fn new(oracle: Arc<dyn DecisionOracle>, timeout: Duration) -> Self {
        Self {
            oracle,
            timeout,
            fallback: HeuristicSummarizer::default(),
        }
    }

    async fn ask(&self, messages: &[ModelMessage]) -> Result<String> {
        let transcript = messages
            .iter()
            .map(|m| self.fallback.line(m))
            .collect::<Vec<_>>()
            .join("\n");
        let request = DecisionRequest::builder()
            .instructions(SUMMARY_INSTRUCTIONS)
            .messages(vec![ModelMessage::user(transcript)])
            .build();
        let reply = with_timeout(self.timeout, self.oracle.decide(&request)).await?;
        let text = reply.text.trim();
        if text.is_empty() {
            return Err(ConductorError::DecisionParse("empty summary".into()));
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl Summarizer for OracleSummarizer {
    async fn summarize(&self, messages: &[ModelMessage]) -> Result<String> {
        match self.ask(messages).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!(error = %e, oracle = self.oracle.name(), "Summary generation failed; using heuristic summary");
                self.fallback.summarize(messages).await
            }
        }
    }
}

//! History compaction that never splits a tool invocation from its results.

pub mod summarizer;

pub use summarizer::{HeuristicSummarizer, OracleSummarizer, Summarizer};

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::CompactionConfig;
use crate::error::Result;
use crate::state::{validate_pairing, SharedState};
use crate::types::ModelMessage;

/// Indivisible slice of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Unit {
    /// A tool invocation followed by the results answering it.
    Pair(Range<usize>),
    Single(usize),
}

impl Unit {
    fn start(&self) -> usize {
        match self {
            Self::Pair(r) => r.start,
            Self::Single(i) => *i,
        }
    }

    fn end(&self) -> usize {
        match self {
            Self::Pair(r) => r.end,
            Self::Single(i) => i + 1,
        }
    }
}

fn segment(messages: &[ModelMessage]) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut i = 0;
    while i < messages.len() {
        let msg = &messages[i];
        if !msg.is_tool_call() {
            units.push(Unit::Single(i));
            i += 1;
            continue;
        }
        let calls = msg.tool_calls();
        let ids: HashSet<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        let mut j = i + 1;
        while let Some(result) = messages.get(j).and_then(ModelMessage::tool_result_part) {
            if !ids.contains(result.tool_call_id.as_str()) {
                break;
            }
            j += 1;
        }
        units.push(Unit::Pair(i..j));
        i = j;
    }
    units
}

/// Head runs shorter than this stay verbatim.
const MIN_SUMMARY_RUN: usize = 2;

/// Head messages waiting to be folded into one summary.
#[derive(Default)]
struct PendingRun {
    messages: Vec<ModelMessage>,
    /// Names of tools whose pairs were dropped into this run.
    tools: Vec<String>,
    dropped: usize,
}

impl PendingRun {
    fn drop_pair(&mut self, pair: &[ModelMessage]) {
        for call in pair.iter().flat_map(ModelMessage::tool_calls) {
            if !self.tools.contains(&call.name) {
                self.tools.push(call.name.clone());
            }
        }
        self.dropped += pair.len();
    }
}

/// Shrinks a message log by summarizing older plain-message runs and
/// folding head tool pairs into those summaries.
pub struct HistoryCompactor {
    summarizer: Arc<dyn Summarizer>,
    keep_recent: usize,
    trigger_messages: usize,
    drop_tool_pairs: bool,
}

impl HistoryCompactor {
    pub fn new(summarizer: Arc<dyn Summarizer>, keep_recent: usize) -> Self {
        Self {
            summarizer,
            keep_recent: keep_recent.max(1),
            trigger_messages: usize::MAX,
            drop_tool_pairs: true,
        }
    }

    pub fn from_config(summarizer: Arc<dyn Summarizer>, config: &CompactionConfig) -> Self {
        Self::new(summarizer, config.keep_recent)
            .with_trigger(config.trigger_messages)
            .with_drop_tool_pairs(config.drop_tool_pairs)
    }

    pub fn heuristic(keep_recent: usize) -> Self {
        Self::new(Arc::new(HeuristicSummarizer::default()), keep_recent)
    }

    pub fn with_trigger(mut self, trigger_messages: usize) -> Self {
        self.trigger_messages = trigger_messages;
        self
    }

    /// Fold head tool pairs into the neighbouring summary. When off, they
    /// are kept verbatim between summaries.
    pub fn with_drop_tool_pairs(mut self, drop: bool) -> Self {
        self.drop_tool_pairs = drop;
        self
    }

    pub fn keep_recent(&self) -> usize {
        self.keep_recent
    }

    /// Index where the verbatim tail starts, moved earlier so it never lands
    /// inside a tool pair.
    fn tail_start(&self, units: &[Unit], len: usize) -> usize {
        let nominal = len.saturating_sub(self.keep_recent);
        units
            .iter()
            .find(|u| u.start() <= nominal && nominal < u.end())
            .map(Unit::start)
            .unwrap_or(nominal)
    }

    /// Compact `messages`. Returns the input unchanged when nothing in the
    /// head is eligible for summarization.
    pub async fn compact(&self, messages: &[ModelMessage]) -> Result<Vec<ModelMessage>> {
        let (out, _) = self.compact_with_boundary(messages).await?;
        Ok(out)
    }

    async fn compact_with_boundary(&self, messages: &[ModelMessage]) -> Result<(Vec<ModelMessage>, usize)> {
        if messages.len() <= self.keep_recent {
            return Ok((messages.to_vec(), 0));
        }
        let units = segment(messages);
        let tail_start = self.tail_start(&units, messages.len());

        let mut out: Vec<ModelMessage> = Vec::with_capacity(messages.len());
        let mut run = PendingRun::default();
        let mut changed = false;

        for unit in units.iter().take_while(|u| u.start() < tail_start) {
            match unit {
                Unit::Single(i) if !messages[*i].is_summary() => run.messages.push(messages[*i].clone()),
                Unit::Single(i) => {
                    changed |= self.flush(&mut run, &mut out).await?;
                    out.push(messages[*i].clone());
                }
                Unit::Pair(range) if self.drop_tool_pairs => run.drop_pair(&messages[range.clone()]),
                Unit::Pair(range) => {
                    changed |= self.flush(&mut run, &mut out).await?;
                    out.extend_from_slice(&messages[range.clone()]);
                }
            }
        }
        changed |= self.flush(&mut run, &mut out).await?;

        if !changed {
            return Ok((messages.to_vec(), tail_start));
        }

        let boundary = out.len();
        out.extend_from_slice(&messages[tail_start..]);
        validate_pairing(&out)?;
        debug!(
            before = messages.len(),
            after = out.len(),
            boundary,
            "Compacted message history"
        );
        Ok((out, boundary))
    }

    /// Emit `run` as one summary, or verbatim when it is too short to be
    /// worth one. Returns whether anything was summarized.
    async fn flush(&self, run: &mut PendingRun, out: &mut Vec<ModelMessage>) -> Result<bool> {
        let run = std::mem::take(run);
        if run.tools.is_empty() && run.messages.len() < MIN_SUMMARY_RUN {
            out.extend(run.messages);
            return Ok(false);
        }
        let mut text = if run.messages.is_empty() {
            String::new()
        } else {
            self.summarizer.summarize(&run.messages).await?
        };
        if !run.tools.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("Tools used: {}", run.tools.join(", ")));
        }
        out.push(ModelMessage::summary(text, run.messages.len() + run.dropped));
        Ok(true)
    }

    /// Compact the state in place once it grows past the trigger. Returns
    /// whether the log changed.
    pub async fn maybe_compact(&self, state: &mut SharedState) -> Result<bool> {
        if state.messages.len() <= self.trigger_messages {
            return Ok(false);
        }
        let before = state.messages.len();
        let (out, boundary) = self.compact_with_boundary(&state.messages).await?;
        if out.len() == before && out == state.messages {
            return Ok(false);
        }
        info!(
            session_id = %state.session_id,
            before,
            after = out.len(),
            "History compacted"
        );
        state.messages = out;
        state.compressed_history_marker = boundary;
        Ok(true)
    }
}

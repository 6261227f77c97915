//! Tool invocation / tool result pairing checks.

use std::collections::{HashMap, HashSet};

use crate::error::{ConductorError, Result};
use crate::types::{ModelMessage, Role};

/// Verify that every tool invocation is immediately followed by exactly one
/// result per call id and that no result appears without its invocation.
pub fn validate_pairing(messages: &[ModelMessage]) -> Result<()> {
    let mut i = 0usize;
    while i < messages.len() {
        let msg = &messages[i];
        if msg.is_tool_result() {
            return Err(violation(i, "tool result without a preceding invocation"));
        }
        if !msg.is_tool_call() {
            i += 1;
            continue;
        }

        let calls = msg.tool_calls();
        let mut pending: HashSet<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        let expected = pending.len();
        for offset in 1..=expected {
            let idx = i + offset;
            let Some(next) = messages.get(idx) else {
                return Err(violation(i, "tool invocation without its result"));
            };
            let id = next
                .tool_result_part()
                .map(|r| r.tool_call_id.as_str())
                .ok_or_else(|| violation(idx, "expected a tool result"))?;
            if !pending.remove(id) {
                return Err(violation(idx, format!("unexpected tool result id {id}")));
            }
        }
        i += 1 + expected;
    }
    Ok(())
}

fn violation(index: usize, reason: impl Into<String>) -> ConductorError {
    ConductorError::PairingViolation {
        index,
        reason: reason.into(),
    }
}

/// Repair a log so it satisfies [`validate_pairing`]: orphan results are
/// dropped and invocations missing a result get a synthetic error result.
pub fn normalize_tool_pairing(messages: &[ModelMessage]) -> Vec<ModelMessage> {
    let mut out: Vec<ModelMessage> = Vec::with_capacity(messages.len());
    let mut seen_results: HashSet<String> = HashSet::new();

    let mut i = 0usize;
    while i < messages.len() {
        let msg = &messages[i];
        if !msg.is_tool_call() {
            if !msg.is_tool_result() {
                out.push(msg.clone());
            }
            i += 1;
            continue;
        }

        let calls = msg.tool_calls();
        let call_ids: HashSet<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        let mut found: HashMap<String, ModelMessage> = HashMap::new();
        let mut interleaved: Vec<ModelMessage> = Vec::new();

        let mut j = i + 1;
        while j < messages.len() {
            let next = &messages[j];
            if matches!(next.role, Role::Assistant | Role::User | Role::System) {
                break;
            }
            match next.tool_result_part() {
                Some(r)
                    if call_ids.contains(r.tool_call_id.as_str())
                        && !seen_results.contains(&r.tool_call_id) =>
                {
                    seen_results.insert(r.tool_call_id.clone());
                    found.insert(r.tool_call_id.clone(), next.clone());
                }
                Some(_) => {}
                None => interleaved.push(next.clone()),
            }
            j += 1;
        }

        out.push(msg.clone());
        for call in calls {
            match found.remove(&call.id) {
                Some(result) => out.push(result),
                None => out.push(ModelMessage::tool_result(
                    call.id.clone(),
                    serde_json::json!({
                        "error": "tool result missing from history; synthetic error inserted",
                    }),
                    true,
                )),
            }
        }
        out.extend(interleaved);
        i = j;
    }

    out
}

//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Serialization,
    ToolExecution,
    Decision,
    Invariant,
    Limit,
    Unknown,
}

/// Category surfaced to callers of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Decision,
    Tool,
    StepLimit,
    Timeout,
    Internal,
}

impl FailureKind {
    /// Response text shown to the end user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Decision => {
                "The assistant could not decide how to continue. Please try again."
            }
            Self::Tool => "A required tool could not complete the request. Please try again.",
            Self::StepLimit => {
                "The request needed more steps than allowed and was stopped. Please narrow the request."
            }
            Self::Timeout => "The request took too long and was stopped. Please try again.",
            Self::Internal => "An internal error occurred while handling the request.",
        }
    }
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    CheckToolImplementation,
    RetryDecision,
    RaiseLimits,
    ContactSupport,
}

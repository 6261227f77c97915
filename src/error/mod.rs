//! Error types for conductor.

pub mod unified;

pub use unified::{ErrorCategory, FailureKind, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all conductor operations.
#[derive(Error, Debug)]
pub enum ConductorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Connection-level fault talking to the tool service (closed session,
    /// failed send, failed handshake). Always considered transient.
    #[error("Tool transport error: {0}")]
    Transport(String),

    /// The tool service ran the tool and reported a business error.
    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Decision parse error: {0}")]
    DecisionParse(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Tool pairing violated at message {index}: {reason}")]
    PairingViolation { index: usize, reason: String },

    #[error("Global step limit of {limit} exceeded")]
    StepLimitExceeded { limit: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl ConductorError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Transport(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) | Self::ConfigFile(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::DecisionParse(_) => ErrorCategory::Decision,
            Self::PairingViolation { .. } => ErrorCategory::Invariant,
            Self::StepLimitExceeded { .. } => ErrorCategory::Limit,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Network => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Server => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::Decision => RecoverySuggestion::RetryDecision,
            ErrorCategory::Limit => RecoverySuggestion::RaiseLimits,
            _ => RecoverySuggestion::ContactSupport,
        }
    }

    /// User-facing failure category; never carries transport detail.
    pub fn failure_kind(&self) -> FailureKind {
        match self.category() {
            ErrorCategory::Timeout => FailureKind::Timeout,
            ErrorCategory::Limit => FailureKind::StepLimit,
            ErrorCategory::ToolExecution => FailureKind::Tool,
            ErrorCategory::Decision
            | ErrorCategory::Network
            | ErrorCategory::Server
            | ErrorCategory::RateLimit
            | ErrorCategory::Api
            | ErrorCategory::Authentication => FailureKind::Decision,
            _ => FailureKind::Internal,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ConductorError>;

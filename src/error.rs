// src/error.rs
// Error taxonomy for the orchestration engine

use std::fmt;
use thiserror::Error;

/// Why a structured execution result was rejected by the output validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMismatch {
    /// The new ordering had no entries at all
    EmptyOrder,
    /// Item references in the new ordering do not match the input item count
    ItemCount { expected: usize, actual: usize },
    /// An item identifier appears more than once
    DuplicateItem(String),
    /// An identifier that was never part of the input mapping
    UnknownItem(String),
    /// An analysis-type intent came back with a different ordering
    OrderChanged,
}

impl fmt::Display for OutputMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyOrder => write!(f, "new order is empty"),
            Self::ItemCount { expected, actual } => write!(
                f,
                "new order references {} items but the input has {}",
                actual, expected
            ),
            Self::DuplicateItem(id) => write!(f, "item '{}' appears more than once", id),
            Self::UnknownItem(id) => write!(f, "item '{}' is not part of the input", id),
            Self::OrderChanged => write!(f, "analysis must not change the current order"),
        }
    }
}

/// Main error type for the montage library
#[derive(Error, Debug)]
pub enum MontageError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unknown intent: {0}")]
    UnknownIntent(String),

    #[error("LLM call failed: {message}")]
    LlmCall { message: String, retryable: bool },

    #[error("could not parse model output: {0}")]
    Parse(String),

    #[error("output mismatch: {0}")]
    OutputMismatch(OutputMismatch),

    #[error("execution reported failure: {0}")]
    ExecutionFailed(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("context budget exceeded: need {required} tokens, model limit is {limit}")]
    ContextBudget { required: u64, limit: u64 },

    #[error("function '{name}' failed: {message}")]
    Function { name: String, message: String },

    #[error("could not apply change: {0}")]
    Apply(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("turn cancelled")]
    Cancelled,

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using MontageError
pub type Result<T> = std::result::Result<T, MontageError>;

impl MontageError {
    pub fn llm(message: impl Into<String>, retryable: bool) -> Self {
        Self::LlmCall {
            message: message.into(),
            retryable,
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Stable tag used in responses and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::UnknownIntent(_) => "unknown_intent_error",
            Self::LlmCall { .. } => "llm_call_error",
            Self::Parse(_) => "parse_error",
            Self::OutputMismatch(_) => "output_mismatch_error",
            Self::ExecutionFailed(_) => "execution_failed",
            Self::Persistence(_) | Self::Db(_) => "persistence_error",
            Self::ContextBudget { .. } | Self::Config(_) => "configuration_error",
            Self::Function { .. } => "function_error",
            Self::Apply(_) => "apply_error",
            Self::Cancelled => "cancelled",
            Self::Json(_) | Self::Anyhow(_) => "internal_error",
        }
    }

    /// Whether the execution stage may try once more after this failure
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LlmCall { retryable, .. } => *retryable,
            Self::Parse(_) => true,
            _ => false,
        }
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Db(_))
    }

    /// Message shown to the user in an error-role chat message
    pub fn to_user_string(&self) -> String {
        match self {
            Self::OutputMismatch(m) => format!("The proposed change was incomplete: {}", m),
            Self::ExecutionFailed(reason) => format!("The change could not be produced: {}", reason),
            Self::UnknownIntent(name) => format!("I don't know how to perform '{}'", name),
            other => other.to_string(),
        }
    }
}

impl From<OutputMismatch> for MontageError {
    fn from(m: OutputMismatch) -> Self {
        MontageError::OutputMismatch(m)
    }
}

impl From<reqwest::Error> for MontageError {
    fn from(err: reqwest::Error) -> Self {
        let retryable = err.is_timeout() || err.is_connect() || err.is_request();
        MontageError::LlmCall {
            message: err.to_string(),
            retryable,
        }
    }
}

impl From<tokio::task::JoinError> for MontageError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            MontageError::Cancelled
        } else {
            MontageError::Anyhow(anyhow::anyhow!(err.to_string()))
        }
    }
}

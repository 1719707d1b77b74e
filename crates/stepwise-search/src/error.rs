//! Error types for the stepwise search

use task_graph::TaskGraphError;
use thiserror::Error;

/// Result type alias using SearchError
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors raised while configuring or running a search
#[derive(Debug, Error)]
pub enum SearchError {
    /// Only the forward stepwise algorithm is available
    #[error("Unsupported search algorithm '{0}': only 'scm-forward' is supported")]
    UnsupportedAlgorithm(String),

    /// Significance level outside (0, 1]
    #[error("Invalid significance level {0}: must be in (0, 1]")]
    InvalidAlpha(f64),

    /// Malformed effect or effect list
    #[error("Invalid effect: {0}")]
    InvalidEffect(String),

    /// The model collaborator reported a failure
    #[error("Model error: {0}")]
    Model(String),

    /// A task produced a value of the wrong kind
    #[error("Unexpected task value: expected {expected}, got {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },

    /// Building or executing a workflow failed
    #[error("Workflow error: {0}")]
    Workflow(#[from] TaskGraphError),

    /// Configuration or table serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    /// Create a model error with a message
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create an invalid effect error with a message
    pub fn invalid_effect(msg: impl Into<String>) -> Self {
        Self::InvalidEffect(msg.into())
    }
}

impl From<SearchError> for TaskGraphError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Workflow(inner) => inner,
            other => TaskGraphError::failed(other.to_string()),
        }
    }
}

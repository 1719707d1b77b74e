//! Error types for the task graph

use thiserror::Error;

/// Result type alias using TaskGraphError
pub type Result<T> = std::result::Result<T, TaskGraphError>;

/// Errors that can occur while building or executing a workflow
#[derive(Debug, Error)]
pub enum TaskGraphError {
    /// A task was connected to itself
    #[error("Task '{0}' cannot be connected to itself")]
    SelfLoop(String),

    /// Adding an edge (or resolving references) would close a cycle
    #[error("Cycle detected: '{from}' -> '{to}'")]
    CycleDetected { from: String, to: String },

    /// An edge or input references a task that is not part of the workflow
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// A task operation returned an error
    #[error("Task '{task}' failed in execution '{execution}': {message}")]
    TaskFailed {
        task: String,
        execution: String,
        message: String,
    },

    /// A task operation panicked
    #[error("Task panicked in execution '{execution}': {message}")]
    TaskPanicked { execution: String, message: String },

    /// An execution with the same name is still running
    #[error("Execution '{0}' is already running")]
    DuplicateExecution(String),

    /// The scheduler service has shut down
    #[error("Scheduler unavailable")]
    SchedulerUnavailable,

    /// An operation received arguments it cannot use
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation-level failure
    #[error("Task execution failed: {0}")]
    ExecutionFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaskGraphError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create an invalid input error with a message
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error comes from the shape of the graph rather than from running it
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            Self::SelfLoop(_) | Self::CycleDetected { .. } | Self::UnknownTask(_)
        )
    }
}

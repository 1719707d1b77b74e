//! Event types for streaming execution progress
//!
//! Events are sent from the scheduler to any consumer to report task and
//! workflow lifecycle changes. Every event carries the execution name, so
//! nested executions can be told apart from the one that submitted them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Trait for sending execution events
///
/// This abstracts over the transport mechanism (channel, log, collector)
/// so the engine can be embedded in different hosts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// An execution was accepted and started
    #[serde(rename_all = "camelCase")]
    WorkflowStarted {
        workflow_id: String,
        execution_id: String,
        task_count: usize,
    },

    /// All tasks of an execution completed
    #[serde(rename_all = "camelCase")]
    WorkflowCompleted {
        workflow_id: String,
        execution_id: String,
        output_count: usize,
    },

    /// An execution was aborted
    #[serde(rename_all = "camelCase")]
    WorkflowFailed {
        workflow_id: String,
        execution_id: String,
        error: String,
    },

    /// A task started executing
    #[serde(rename_all = "camelCase")]
    TaskStarted {
        task_id: String,
        execution_id: String,
    },

    /// A task completed successfully
    #[serde(rename_all = "camelCase")]
    TaskCompleted {
        task_id: String,
        execution_id: String,
    },

    /// A task failed
    #[serde(rename_all = "camelCase")]
    TaskFailed {
        task_id: String,
        execution_id: String,
        error: String,
    },

    /// Progress update reported by a running task
    #[serde(rename_all = "camelCase")]
    TaskProgress {
        task_id: String,
        execution_id: String,
        progress: f32,
        message: Option<String>,
    },
}

impl WorkflowEvent {
    /// Create a task progress event
    pub fn task_progress(task_id: &str, execution_id: &str, progress: f32, message: Option<String>) -> Self {
        Self::TaskProgress {
            task_id: task_id.to_string(),
            execution_id: execution_id.to_string(),
            progress,
            message,
        }
    }

    /// Execution the event belongs to
    pub fn execution_id(&self) -> &str {
        match self {
            Self::WorkflowStarted { execution_id, .. }
            | Self::WorkflowCompleted { execution_id, .. }
            | Self::WorkflowFailed { execution_id, .. }
            | Self::TaskStarted { execution_id, .. }
            | Self::TaskCompleted { execution_id, .. }
            | Self::TaskFailed { execution_id, .. }
            | Self::TaskProgress { execution_id, .. } => execution_id,
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Event sink that forwards events to the `log` facade at debug level
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        match &event {
            WorkflowEvent::WorkflowFailed { error, .. } | WorkflowEvent::TaskFailed { error, .. } => {
                log::warn!("[{}] {:?}: {}", event.execution_id(), event, error)
            }
            _ => log::debug!("[{}] {:?}", event.execution_id(), event),
        }
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Collected events of one execution
    pub fn events_for(&self, execution_id: &str) -> Vec<WorkflowEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.execution_id() == execution_id)
            .cloned()
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();

        sink.send(WorkflowEvent::task_progress("task1", "exec1", 0.5, Some("halfway".to_string())))
            .unwrap();
        sink.send(WorkflowEvent::TaskStarted {
            task_id: "task2".to_string(),
            execution_id: "exec2".to_string(),
        })
        .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(sink.events_for("exec2").len(), 1);

        match &events[0] {
            WorkflowEvent::TaskProgress { task_id, progress, .. } => {
                assert_eq!(task_id, "task1");
                assert_eq!(*progress, 0.5);
            }
            _ => panic!("Expected TaskProgress event"),
        }

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_null_event_sink() {
        let sink = NullEventSink;
        // Should not panic
        sink.send(WorkflowEvent::task_progress("task1", "exec1", 1.0, None))
            .unwrap();
    }

    #[test]
    fn test_event_serialization() {
        let event = WorkflowEvent::TaskFailed {
            task_id: "fit-1".to_string(),
            execution_id: "round-1".to_string(),
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "taskFailed");
        assert_eq!(json["executionId"], "round-1");
    }
}

//! Scheduler service and the handles used to talk to it
//!
//! Executions are requested by message: an [`ExecutionHandle`] sends a
//! submission (workflow, unique name, reply channel) to the scheduler
//! service, which starts a private run for it and answers on the reply
//! channel once every task has completed or one has failed.
//!
//! Running tasks receive an [`ExecutionContext`] that carries a handle, so
//! an operation can submit a nested workflow and await its leaf results
//! without any global state.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Semaphore};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::error::{Result, TaskGraphError};
use crate::events::{EventSink, WorkflowEvent};
use crate::executor;
use crate::task::TaskValue;
use crate::workflow::Workflow;

/// State shared by the service and every handle
pub(crate) struct SchedulerShared {
    /// Worker pool for blocking operations
    pub(crate) workers: Arc<Semaphore>,
    /// Destination of lifecycle events
    pub(crate) event_sink: Arc<dyn EventSink>,
    /// Names of executions currently running
    active: Mutex<HashSet<String>>,
}

impl SchedulerShared {
    pub(crate) fn emit(&self, event: WorkflowEvent) {
        let _ = self.event_sink.send(event);
    }
}

/// A request to run a workflow
struct Submission<V> {
    workflow: Workflow<V>,
    name: String,
    handle: ExecutionHandle<V>,
    reply: oneshot::Sender<Result<Vec<V>>>,
}

/// Cloneable handle to a running scheduler service
///
/// The service stops once every handle (including those held by running
/// tasks) has been dropped.
pub struct ExecutionHandle<V> {
    sender: mpsc::UnboundedSender<Submission<V>>,
    pub(crate) shared: Arc<SchedulerShared>,
}

impl<V> Clone for ExecutionHandle<V> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V> fmt::Debug for ExecutionHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("active", &self.shared.active.lock().len())
            .finish()
    }
}

impl<V: TaskValue> ExecutionHandle<V> {
    /// Start a scheduler service on the current tokio runtime
    pub fn spawn(config: ExecutorConfig, event_sink: Arc<dyn EventSink>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(SchedulerShared {
            workers: Arc::new(Semaphore::new(config.workers())),
            event_sink,
            active: Mutex::new(HashSet::new()),
        });

        log::debug!("Starting scheduler with {} workers", config.workers());
        tokio::spawn(serve(receiver, Arc::clone(&shared)));

        Self { sender, shared }
    }

    /// Run a workflow under a generated name and return its leaf results
    pub async fn execute(&self, workflow: Workflow<V>) -> Result<Vec<V>> {
        let name = format!("{}-{}", workflow.name(), Uuid::new_v4().simple());
        self.call_workflow(workflow, name).await
    }

    /// Run a workflow under `name` and return its leaf results in leaf order
    ///
    /// Fails with [`TaskGraphError::DuplicateExecution`] if an execution
    /// with the same name is still running.
    pub async fn call_workflow(
        &self,
        workflow: Workflow<V>,
        name: impl Into<String>,
    ) -> Result<Vec<V>> {
        let (reply, response) = oneshot::channel();
        let submission = Submission {
            workflow,
            name: name.into(),
            handle: self.clone(),
            reply,
        };
        self.sender
            .send(submission)
            .map_err(|_| TaskGraphError::SchedulerUnavailable)?;
        response
            .await
            .map_err(|_| TaskGraphError::SchedulerUnavailable)?
    }

    /// Whether an execution with this name is running
    pub fn is_running(&self, name: &str) -> bool {
        self.shared.active.lock().contains(name)
    }
}

/// Service loop: accept submissions and start one run per submission
async fn serve<V: TaskValue>(
    mut receiver: mpsc::UnboundedReceiver<Submission<V>>,
    shared: Arc<SchedulerShared>,
) {
    while let Some(submission) = receiver.recv().await {
        let Submission {
            workflow,
            name,
            handle,
            reply,
        } = submission;

        if !shared.active.lock().insert(name.clone()) {
            log::warn!("Rejecting execution '{}': name already running", name);
            let _ = reply.send(Err(TaskGraphError::DuplicateExecution(name)));
            continue;
        }

        // A caller that stops waiting (an aborted parent task) cancels the run
        let shared = Arc::clone(&shared);
        let mut reply = reply;
        tokio::spawn(async move {
            let outcome = tokio::select! {
                result = executor::run(workflow, &name, handle) => Some(result),
                _ = reply.closed() => None,
            };
            shared.active.lock().remove(&name);
            match outcome {
                Some(result) => {
                    let _ = reply.send(result);
                }
                None => log::warn!("Execution '{}' cancelled: caller went away", name),
            }
        });
    }
    log::debug!("Scheduler service stopped");
}

/// Handed to every running operation
pub struct ExecutionContext<V> {
    execution: String,
    task_key: String,
    handle: ExecutionHandle<V>,
}

impl<V> ExecutionContext<V> {
    pub(crate) fn new(execution: &str, task_key: String, handle: ExecutionHandle<V>) -> Self {
        Self {
            execution: execution.to_string(),
            task_key,
            handle,
        }
    }

    /// Name of the execution this task belongs to
    pub fn execution_name(&self) -> &str {
        &self.execution
    }

    /// Key of the running task
    pub fn task_key(&self) -> &str {
        &self.task_key
    }

    /// Handle to the scheduler running this task
    pub fn handle(&self) -> &ExecutionHandle<V> {
        &self.handle
    }

    /// Report progress of the running task
    pub fn report_progress(&self, progress: f32, message: Option<String>) {
        self.handle.shared.emit(WorkflowEvent::task_progress(
            &self.task_key,
            &self.execution,
            progress,
            message,
        ));
    }
}

impl<V: TaskValue> ExecutionContext<V> {
    /// Run a nested workflow to completion and return its leaf results
    ///
    /// The calling task is suspended (it holds no worker permit) until the
    /// nested execution finishes.
    pub async fn call_workflow(
        &self,
        workflow: Workflow<V>,
        name: impl Into<String>,
    ) -> Result<Vec<V>> {
        let name = name.into();
        log::debug!(
            "Task '{}' in '{}' submits nested execution '{}'",
            self.task_key,
            self.execution,
            name
        );
        self.handle.call_workflow(workflow, name).await
    }

    /// Run blocking work on the worker pool
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.handle.shared.workers)
            .acquire_owned()
            .await
            .map_err(|_| TaskGraphError::SchedulerUnavailable)?;

        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| TaskGraphError::TaskPanicked {
            execution: self.execution.clone(),
            message: e.to_string(),
        })?;
        outcome
    }
}

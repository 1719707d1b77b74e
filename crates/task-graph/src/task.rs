//! Tasks and the operations they invoke
//!
//! A [`Task`] is an immutable, named unit of work. It binds an
//! [`Operation`] to an ordered list of [`TaskInput`]s. Inputs are either
//! literal values or references to other tasks whose results are
//! substituted by the executor before the operation runs.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Result, TaskGraphError};
use crate::scheduler::ExecutionContext;

/// Values that can flow through a workflow
///
/// Results are cloned once per consumer, so cheap clones (or `Arc`s)
/// are preferable for large payloads.
pub trait TaskValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> TaskValue for T {}

/// Graph identity of a task
///
/// Names are for humans and need not be unique; two tasks are the same
/// node only if their ids match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// One input slot of a task
#[derive(Debug, Clone)]
pub enum TaskInput<V> {
    /// A value bound at construction
    Literal(V),
    /// The result of another task
    Task(TaskId),
    /// The results of several tasks, in order
    Tasks(Vec<TaskId>),
}

impl<V> TaskInput<V> {
    /// Reference the result of `task`
    pub fn task(task: &Task<V>) -> Self {
        Self::Task(task.id())
    }

    /// Reference the results of `tasks`, in iteration order
    pub fn tasks<'a>(tasks: impl IntoIterator<Item = &'a Task<V>>) -> Self
    where
        V: 'a,
    {
        Self::Tasks(tasks.into_iter().map(Task::id).collect())
    }

    /// Ids of all tasks this input refers to
    pub fn referenced(&self) -> Vec<TaskId> {
        match self {
            Self::Literal(_) => Vec::new(),
            Self::Task(id) => vec![*id],
            Self::Tasks(ids) => ids.clone(),
        }
    }
}

impl<V> From<&Task<V>> for TaskInput<V> {
    fn from(task: &Task<V>) -> Self {
        Self::task(task)
    }
}

/// A resolved argument handed to an operation
#[derive(Debug, Clone, PartialEq)]
pub enum Arg<V> {
    /// A single value (literal, task result or predecessor result)
    Value(V),
    /// The results of a [`TaskInput::Tasks`] slot
    List(Vec<V>),
}

impl<V> Arg<V> {
    /// Take the single value, failing on a list
    pub fn into_value(self) -> Result<V> {
        match self {
            Self::Value(v) => Ok(v),
            Self::List(_) => Err(TaskGraphError::invalid_input(
                "expected a single value, got a list",
            )),
        }
    }

    /// Take the list, treating a single value as a one-element list
    pub fn into_list(self) -> Vec<V> {
        match self {
            Self::Value(v) => vec![v],
            Self::List(values) => values,
        }
    }
}

/// The callable part of a task
///
/// Implementors receive the resolved arguments in slot order: first the
/// task's own inputs, then one [`Arg::Value`] per graph predecessor in the
/// order the edges were added.
#[async_trait]
pub trait Operation<V>: Send + Sync + 'static {
    /// Label used in logs, events and [`crate::Workflow::as_dict`]
    fn label(&self) -> &str;

    /// Run the operation
    async fn call(&self, args: Vec<Arg<V>>, ctx: &ExecutionContext<V>) -> Result<V>;
}

/// Operation backed by a synchronous closure that runs inline on the runtime
///
/// Use this for cheap glue (identity, gather, reshaping).
pub struct FnOperation<F> {
    label: String,
    f: F,
}

/// Create an inline operation from a closure
pub fn from_fn<V, F>(label: impl Into<String>, f: F) -> FnOperation<F>
where
    V: TaskValue,
    F: Fn(Vec<Arg<V>>) -> Result<V> + Send + Sync + 'static,
{
    FnOperation {
        label: label.into(),
        f,
    }
}

#[async_trait]
impl<V, F> Operation<V> for FnOperation<F>
where
    V: TaskValue,
    F: Fn(Vec<Arg<V>>) -> Result<V> + Send + Sync + 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    async fn call(&self, args: Vec<Arg<V>>, _ctx: &ExecutionContext<V>) -> Result<V> {
        (self.f)(args)
    }
}

/// Operation backed by a blocking closure
///
/// The closure runs on the blocking thread pool and holds one worker
/// permit while it runs, so at most `max_workers` blocking operations are
/// in flight per scheduler.
pub struct BlockingOperation<F> {
    label: String,
    f: Arc<F>,
}

/// Create a blocking operation from a closure
pub fn blocking_fn<V, F>(label: impl Into<String>, f: F) -> BlockingOperation<F>
where
    V: TaskValue,
    F: Fn(Vec<Arg<V>>) -> Result<V> + Send + Sync + 'static,
{
    BlockingOperation {
        label: label.into(),
        f: Arc::new(f),
    }
}

#[async_trait]
impl<V, F> Operation<V> for BlockingOperation<F>
where
    V: TaskValue,
    F: Fn(Vec<Arg<V>>) -> Result<V> + Send + Sync + 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    async fn call(&self, args: Vec<Arg<V>>, ctx: &ExecutionContext<V>) -> Result<V> {
        let f = Arc::clone(&self.f);
        ctx.run_blocking(move || f(args)).await
    }
}

struct TaskInner<V> {
    id: TaskId,
    name: String,
    operation: Arc<dyn Operation<V>>,
    inputs: Vec<TaskInput<V>>,
}

/// A named unit of work
///
/// Cloning a task is cheap and yields the same graph node.
pub struct Task<V> {
    inner: Arc<TaskInner<V>>,
}

impl<V: TaskValue> Task<V> {
    /// Create a task from an operation and its inputs
    pub fn new(
        name: impl Into<String>,
        operation: impl Operation<V>,
        inputs: Vec<TaskInput<V>>,
    ) -> Self {
        Self::from_shared(name, Arc::new(operation), inputs)
    }

    /// Create a task from an operation shared with other tasks
    pub fn from_shared(
        name: impl Into<String>,
        operation: Arc<dyn Operation<V>>,
        inputs: Vec<TaskInput<V>>,
    ) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id: TaskId::new(),
                name: name.into(),
                operation,
                inputs,
            }),
        }
    }

    /// The operation invoked by this task
    pub fn operation(&self) -> &Arc<dyn Operation<V>> {
        &self.inner.operation
    }
}

impl<V> Task<V> {
    /// Graph identity
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// Human-readable name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Bound inputs, in slot order
    pub fn inputs(&self) -> &[TaskInput<V>] {
        &self.inner.inputs
    }

    /// Unique key combining name and id, used for inspection output
    pub fn key(&self) -> String {
        format!("{}-{}", self.inner.name, self.inner.id)
    }

    /// Ids of every task referenced by the inputs
    pub fn referenced_tasks(&self) -> Vec<TaskId> {
        self.inner
            .inputs
            .iter()
            .flat_map(TaskInput::referenced)
            .collect()
    }
}

impl<V> Clone for Task<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> PartialEq for Task<V> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<V> Eq for Task<V> {}

impl<V> Hash for Task<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<V> fmt::Debug for Task<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("inputs", &self.inner.inputs.len())
            .finish()
    }
}

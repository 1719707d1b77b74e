//! Task graph engine
//!
//! Builds directed acyclic graphs of [`Task`]s and runs them concurrently.
//!
//! # Overview
//!
//! - A [`Task`] binds an [`Operation`] to literal inputs and references to
//!   other tasks.
//! - A [`Workflow`] holds tasks and explicit dependency edges. Workflows
//!   are composed with [`Workflow::merge_workflow`] and
//!   [`Workflow::insert_workflow`].
//! - An [`ExecutionHandle`] talks to a scheduler service that runs
//!   workflows and returns the results of their leaf tasks. Operations can
//!   submit nested workflows through their [`ExecutionContext`].
//!
//! # Example
//!
//! ```ignore
//! let a = Task::new("a", from_fn("one", |_| Ok(1)), vec![]);
//! let b = Task::new("b", from_fn("inc", |args| Ok(args[0].clone().into_value()? + 1)), vec![]);
//! let mut wf = Workflow::with_tasks("example", [a.clone(), b.clone()]);
//! wf.connect(&a, &b)?;
//!
//! let handle = ExecutionHandle::spawn(ExecutorConfig::default(), Arc::new(NullEventSink));
//! assert_eq!(handle.execute(wf).await?, vec![2]);
//! ```

pub mod config;
pub mod error;
pub mod events;
mod executor;
pub mod scheduler;
pub mod task;
mod validation;
pub mod workflow;

pub use config::ExecutorConfig;
pub use error::{Result, TaskGraphError};
pub use events::{EventError, EventSink, LogEventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use scheduler::{ExecutionContext, ExecutionHandle};
pub use task::{
    blocking_fn, from_fn, Arg, BlockingOperation, FnOperation, Operation, Task, TaskId, TaskInput,
    TaskValue,
};
pub use workflow::{RenderedInput, TaskSummary, Workflow};

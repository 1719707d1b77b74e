//! Run loop for one execution
//!
//! Tasks become ready once every dependency (graph predecessor or input
//! reference) has produced a result. Ready tasks are spawned onto a
//! [`JoinSet`] and run concurrently; the first failure aborts the
//! remaining tasks of the execution. Aborting a task drops any nested
//! execution it is waiting on, which cancels that execution as well.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::error::{Result, TaskGraphError};
use crate::events::WorkflowEvent;
use crate::scheduler::{ExecutionContext, ExecutionHandle};
use crate::task::{Arg, Task, TaskId, TaskInput, TaskValue};
use crate::validation::ExecutionPlan;
use crate::workflow::Workflow;

/// Execute `workflow` under `name` and return the results of its leaves
pub(crate) async fn run<V: TaskValue>(
    workflow: Workflow<V>,
    name: &str,
    handle: ExecutionHandle<V>,
) -> Result<Vec<V>> {
    let shared = Arc::clone(&handle.shared);
    let workflow_id = workflow.name().to_string();

    let plan = match ExecutionPlan::build(&workflow) {
        Ok(plan) => plan,
        Err(e) => {
            log::error!("Execution '{}' rejected: {}", name, e);
            shared.emit(WorkflowEvent::WorkflowFailed {
                workflow_id,
                execution_id: name.to_string(),
                error: e.to_string(),
            });
            return Err(e);
        }
    };

    log::debug!(
        "Execution '{}' started: {} tasks, {} ready",
        name,
        plan.len(),
        plan.ready.len()
    );
    shared.emit(WorkflowEvent::WorkflowStarted {
        workflow_id: workflow_id.clone(),
        execution_id: name.to_string(),
        task_count: plan.len(),
    });

    let ExecutionPlan {
        mut pending,
        dependents,
        ready,
    } = plan;
    let mut ready: VecDeque<TaskId> = ready.into();
    let mut results: HashMap<TaskId, V> = HashMap::with_capacity(pending.len());
    let mut running: JoinSet<(TaskId, Result<V>)> = JoinSet::new();

    loop {
        while let Some(id) = ready.pop_front() {
            let Some(task) = workflow.get(id) else {
                continue;
            };
            let args = resolve_args(&workflow, task, &results)?;
            let ctx = ExecutionContext::new(name, task.key(), handle.clone());
            let operation = Arc::clone(task.operation());

            log::trace!("Execution '{}': starting '{}'", name, task.key());
            shared.emit(WorkflowEvent::TaskStarted {
                task_id: task.key(),
                execution_id: name.to_string(),
            });
            running.spawn(async move {
                let output = operation.call(args, &ctx).await;
                (id, output)
            });
        }

        let Some(joined) = running.join_next().await else {
            break;
        };

        match joined {
            Ok((id, Ok(value))) => {
                shared.emit(WorkflowEvent::TaskCompleted {
                    task_id: workflow.label_of(id),
                    execution_id: name.to_string(),
                });
                results.insert(id, value);
                for &next in dependents.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                    if let Some(count) = pending.get_mut(&next) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push_back(next);
                        }
                    }
                }
            }
            Ok((id, Err(e))) => {
                running.abort_all();
                let task = workflow.label_of(id);
                log::error!("Execution '{}' aborted: task '{}' failed: {}", name, task, e);
                shared.emit(WorkflowEvent::TaskFailed {
                    task_id: task.clone(),
                    execution_id: name.to_string(),
                    error: e.to_string(),
                });
                shared.emit(WorkflowEvent::WorkflowFailed {
                    workflow_id,
                    execution_id: name.to_string(),
                    error: e.to_string(),
                });
                return Err(TaskGraphError::TaskFailed {
                    task,
                    execution: name.to_string(),
                    message: e.to_string(),
                });
            }
            Err(join_error) => {
                running.abort_all();
                log::error!("Execution '{}' aborted: {}", name, join_error);
                shared.emit(WorkflowEvent::WorkflowFailed {
                    workflow_id,
                    execution_id: name.to_string(),
                    error: join_error.to_string(),
                });
                return Err(TaskGraphError::TaskPanicked {
                    execution: name.to_string(),
                    message: join_error.to_string(),
                });
            }
        }
    }

    let outputs = workflow
        .leaf_ids()
        .into_iter()
        .map(|id| {
            results.remove(&id).ok_or_else(|| {
                TaskGraphError::failed(format!("no result for leaf '{}'", workflow.label_of(id)))
            })
        })
        .collect::<Result<Vec<V>>>()?;

    log::debug!("Execution '{}' completed with {} outputs", name, outputs.len());
    shared.emit(WorkflowEvent::WorkflowCompleted {
        workflow_id,
        execution_id: name.to_string(),
        output_count: outputs.len(),
    });
    Ok(outputs)
}

/// Substitute references and append predecessor results
fn resolve_args<V: TaskValue>(
    workflow: &Workflow<V>,
    task: &Task<V>,
    results: &HashMap<TaskId, V>,
) -> Result<Vec<Arg<V>>> {
    let lookup = |id: &TaskId| {
        results
            .get(id)
            .cloned()
            .ok_or_else(|| TaskGraphError::UnknownTask(workflow.label_of(*id)))
    };

    let predecessors = workflow.predecessor_ids(task.id());
    let mut args = Vec::with_capacity(task.inputs().len() + predecessors.len());
    for input in task.inputs() {
        args.push(match input {
            TaskInput::Literal(value) => Arg::Value(value.clone()),
            TaskInput::Task(id) => Arg::Value(lookup(id)?),
            TaskInput::Tasks(ids) => Arg::List(ids.iter().map(lookup).collect::<Result<_>>()?),
        });
    }
    for id in predecessors {
        args.push(Arg::Value(lookup(id)?));
    }
    Ok(args)
}

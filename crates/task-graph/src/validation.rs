//! Execution planning for workflows
//!
//! Combines graph edges with input references into one dependency set per
//! task, checks that every reference resolves to a node of the workflow and
//! that the combined dependencies are acyclic.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Result, TaskGraphError};
use crate::task::TaskId;
use crate::workflow::Workflow;

/// Dependency bookkeeping for one execution
#[derive(Debug, Clone)]
pub(crate) struct ExecutionPlan {
    /// Number of distinct tasks each task waits on
    pub(crate) pending: HashMap<TaskId, usize>,
    /// Tasks to notify when a task completes
    pub(crate) dependents: HashMap<TaskId, Vec<TaskId>>,
    /// Tasks with nothing to wait on, in insertion order
    pub(crate) ready: Vec<TaskId>,
}

impl ExecutionPlan {
    /// Build the plan, rejecting unknown references and cycles
    pub(crate) fn build<V>(workflow: &Workflow<V>) -> Result<Self> {
        let mut pending = HashMap::new();
        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();

        for &id in workflow.ids() {
            let Some(task) = workflow.get(id) else {
                continue;
            };

            let mut deps: Vec<TaskId> = Vec::new();
            let mut seen = HashSet::new();
            let all = workflow
                .predecessor_ids(id)
                .iter()
                .copied()
                .chain(task.referenced_tasks());
            for dep in all {
                if workflow.get(dep).is_none() {
                    return Err(TaskGraphError::UnknownTask(format!(
                        "{} (referenced by '{}')",
                        dep,
                        task.key()
                    )));
                }
                if dep == id {
                    return Err(TaskGraphError::SelfLoop(task.key()));
                }
                if seen.insert(dep) {
                    deps.push(dep);
                }
            }

            for &dep in &deps {
                dependents.entry(dep).or_default().push(id);
            }
            pending.insert(id, deps.len());
        }

        let ready: Vec<TaskId> = workflow
            .ids()
            .iter()
            .copied()
            .filter(|id| pending.get(id) == Some(&0))
            .collect();

        let plan = Self {
            pending,
            dependents,
            ready,
        };
        plan.check_acyclic(workflow)?;
        Ok(plan)
    }

    /// Kahn's algorithm over the combined dependencies
    fn check_acyclic<V>(&self, workflow: &Workflow<V>) -> Result<()> {
        let mut in_degree = self.pending.clone();
        let mut queue: VecDeque<TaskId> = self.ready.iter().copied().collect();

        let mut visited = 0;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for &next in self.dependents.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(deg) = in_degree.get_mut(&next) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if visited < self.pending.len() {
            // Report one edge that is still blocked
            let stuck = workflow
                .ids()
                .iter()
                .copied()
                .find(|id| in_degree.get(id).is_some_and(|&d| d > 0));
            let (from, to) = stuck
                .and_then(|to| {
                    self.dependents
                        .iter()
                        .find(|(from, targets)| {
                            targets.contains(&to) && in_degree.get(from).is_some_and(|&d| d > 0)
                        })
                        .map(|(from, _)| (*from, to))
                })
                .map(|(from, to)| (workflow.label_of(from), workflow.label_of(to)))
                .unwrap_or_else(|| (workflow.name().to_string(), workflow.name().to_string()));
            return Err(TaskGraphError::CycleDetected { from, to });
        }

        Ok(())
    }

    /// Number of tasks in the plan
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

//! Workflow: a directed acyclic graph of tasks
//!
//! Nodes live in an arena keyed by [`TaskId`] and keep their insertion
//! order, which is the order used for leaf and source queries. An edge
//! `a -> b` means "the result of `a` is appended to the arguments of `b`".
//! A [`TaskInput::Task`] or [`TaskInput::Tasks`] reference to another node
//! is a dependency too: the referenced task is never a leaf and the
//! referencing task is never a source.
//!
//! The graph is kept acyclic at all times: any edge that would close a
//! cycle, through edges or references, is rejected and the workflow is left
//! unchanged.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Result, TaskGraphError};
use crate::task::{Task, TaskId, TaskInput, TaskValue};
use crate::validation::ExecutionPlan;

/// Rendered input slot in [`Workflow::as_dict`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderedInput {
    /// Debug rendering of a literal value
    Literal(String),
    /// Key of a referenced task
    Task(String),
    /// Keys of a referenced task list
    Tasks(Vec<String>),
}

impl RenderedInput {
    /// The rendered text of a single-valued slot
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(s) | Self::Task(s) => Some(s),
            Self::Tasks(_) => None,
        }
    }
}

/// Inspection record for one task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    /// Operation label
    pub operation: String,
    /// Own inputs followed by graph predecessors
    pub inputs: Vec<RenderedInput>,
}

/// A directed acyclic graph of tasks
pub struct Workflow<V> {
    name: String,
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, Task<V>>,
    successors: HashMap<TaskId, Vec<TaskId>>,
    predecessors: HashMap<TaskId, Vec<TaskId>>,
    edge_count: usize,
}

impl<V> Workflow<V> {
    /// Create an empty workflow
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: Vec::new(),
            tasks: HashMap::new(),
            successors: HashMap::new(),
            predecessors: HashMap::new(),
            edge_count: 0,
        }
    }

    /// Create a workflow seeded with unconnected tasks
    pub fn with_tasks(name: impl Into<String>, tasks: impl IntoIterator<Item = Task<V>>) -> Self {
        let mut wf = Self::new(name);
        wf.add_tasks(tasks);
        wf
    }

    /// Workflow name, used as the default execution name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the workflow
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the workflow has no tasks
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Whether `task` is a node of this workflow
    pub fn contains(&self, task: &Task<V>) -> bool {
        self.tasks.contains_key(&task.id())
    }

    /// Look up a task by id
    pub fn get(&self, id: TaskId) -> Option<&Task<V>> {
        self.tasks.get(&id)
    }

    /// Tasks in insertion order
    pub fn tasks(&self) -> impl Iterator<Item = &Task<V>> + '_ {
        self.order.iter().filter_map(move |id| self.tasks.get(id))
    }

    /// Add a task; adding a task that is already a node does nothing
    pub fn add_task(&mut self, task: Task<V>) {
        let id = task.id();
        if self.tasks.contains_key(&id) {
            return;
        }
        self.order.push(id);
        self.tasks.insert(id, task);
    }

    /// Add several tasks
    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = Task<V>>) {
        for task in tasks {
            self.add_task(task);
        }
    }

    /// Add a task and connect every predecessor to it
    pub fn add_task_after(&mut self, task: Task<V>, predecessors: &[Task<V>]) -> Result<()> {
        let to = task.id();
        self.add_task(task);
        let edges: Vec<(TaskId, TaskId)> = predecessors.iter().map(|p| (p.id(), to)).collect();
        self.connect_all(&edges)
    }

    /// Connect a single edge `from -> to`
    pub fn connect(&mut self, from: &Task<V>, to: &Task<V>) -> Result<()> {
        self.connect_all(&[(from.id(), to.id())])
    }

    /// Connect each predecessor to each of its successors
    ///
    /// The call is atomic: if any edge is rejected (self-loop, cycle,
    /// unknown task) none of the edges of this call are kept.
    pub fn connect_tasks<'a, I, S>(&mut self, mapping: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a Task<V>, S)>,
        S: IntoIterator<Item = &'a Task<V>>,
        V: 'a,
    {
        let edges: Vec<(TaskId, TaskId)> = mapping
            .into_iter()
            .flat_map(|(from, successors)| {
                let from = from.id();
                successors.into_iter().map(move |to| (from, to.id()))
            })
            .collect();
        self.connect_all(&edges)
    }

    /// Tasks nothing depends on, in insertion order
    ///
    /// These are the output tasks: their results are what executing the
    /// workflow returns.
    pub fn leaf_tasks(&self) -> Vec<Task<V>> {
        self.resolve_ids(&self.leaf_ids())
    }

    /// Tasks that depend on nothing, in insertion order
    pub fn source_tasks(&self) -> Vec<Task<V>> {
        self.resolve_ids(&self.source_ids())
    }

    /// Direct predecessors of `task`, in connection order
    pub fn predecessors(&self, task: &Task<V>) -> Vec<Task<V>> {
        self.resolve_ids(self.predecessor_ids(task.id()))
    }

    /// Direct successors of `task`, in connection order
    pub fn successors(&self, task: &Task<V>) -> Vec<Task<V>> {
        self.resolve_ids(self.successor_ids(task.id()))
    }

    /// Merge `other` into this workflow
    ///
    /// With `connect`, every current leaf becomes a predecessor of every
    /// source task of `other`. Without it the graphs are merged side by
    /// side. The node sets must be disjoint. On error the workflow is left
    /// unchanged.
    pub fn merge_workflow(&mut self, other: &Workflow<V>, connect: bool) -> Result<()> {
        self.atomically(|wf| {
            let leaves = wf.leaf_ids();
            wf.absorb(other)?;
            if !connect {
                return Ok(());
            }
            let sources = other.source_ids();
            let edges: Vec<(TaskId, TaskId)> = leaves
                .iter()
                .flat_map(|&from| sources.iter().map(move |&to| (from, to)))
                .collect();
            wf.connect_all(&edges)
        })
    }

    /// Append `other` after `predecessors` (defaults to the current leaves)
    ///
    /// When there are as many predecessors as `other` has source tasks the
    /// two are wired pairwise, so a batch of independent branches can be
    /// extended with one follow-up per branch. Otherwise every source task
    /// follows every predecessor. The node sets must be disjoint. On error
    /// the workflow is left unchanged.
    pub fn insert_workflow(
        &mut self,
        other: &Workflow<V>,
        predecessors: Option<&[Task<V>]>,
    ) -> Result<()> {
        let predecessors: Vec<TaskId> = match predecessors {
            Some(tasks) => tasks.iter().map(Task::id).collect(),
            None => self.leaf_ids(),
        };
        self.atomically(|wf| {
            wf.absorb(other)?;

            let sources = other.source_ids();
            let edges: Vec<(TaskId, TaskId)> = if predecessors.len() == sources.len() {
                predecessors.into_iter().zip(sources).collect()
            } else {
                predecessors
                    .iter()
                    .flat_map(|&from| sources.iter().map(move |&to| (from, to)))
                    .collect()
            };
            wf.connect_all(&edges)
        })
    }

    /// Check that every input reference resolves and the graph can run
    pub fn validate(&self) -> Result<()> {
        ExecutionPlan::build(self).map(|_| ())
    }

    pub(crate) fn ids(&self) -> &[TaskId] {
        &self.order
    }

    pub(crate) fn leaf_ids(&self) -> Vec<TaskId> {
        let referenced: HashSet<TaskId> = self
            .tasks
            .values()
            .flat_map(Task::referenced_tasks)
            .collect();
        self.order
            .iter()
            .copied()
            .filter(|&id| self.successor_ids(id).is_empty() && !referenced.contains(&id))
            .collect()
    }

    pub(crate) fn source_ids(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .copied()
            .filter(|&id| self.predecessor_ids(id).is_empty() && self.reference_ids(id).is_empty())
            .collect()
    }

    /// Nodes referenced by the inputs of `id`
    fn reference_ids(&self, id: TaskId) -> Vec<TaskId> {
        self.tasks
            .get(&id)
            .map(|task| {
                task.referenced_tasks()
                    .into_iter()
                    .filter(|dep| self.tasks.contains_key(dep))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    }

    /// Referenced node to the nodes whose inputs reference it
    fn referrers(&self) -> HashMap<TaskId, Vec<TaskId>> {
        let mut map: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for &id in &self.order {
            for dep in self.reference_ids(id) {
                map.entry(dep).or_default().push(id);
            }
        }
        map
    }

    pub(crate) fn predecessor_ids(&self, id: TaskId) -> &[TaskId] {
        self.predecessors.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn successor_ids(&self, id: TaskId) -> &[TaskId] {
        self.successors.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn label_of(&self, id: TaskId) -> String {
        self.tasks
            .get(&id)
            .map(Task::key)
            .unwrap_or_else(|| id.to_string())
    }

    fn resolve_ids(&self, ids: &[TaskId]) -> Vec<Task<V>> {
        ids.iter().filter_map(|id| self.tasks.get(id).cloned()).collect()
    }

    /// Run `change`, restoring the previous graph if it fails
    fn atomically(&mut self, change: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let snapshot = self.clone();
        let result = change(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }

    /// Copy nodes and edges of `other` without adding cross edges
    fn absorb(&mut self, other: &Workflow<V>) -> Result<()> {
        for task in other.tasks() {
            self.add_task(task.clone());
        }
        let edges: Vec<(TaskId, TaskId)> = other
            .order
            .iter()
            .flat_map(|&from| other.successor_ids(from).iter().map(move |&to| (from, to)))
            .collect();
        self.connect_all(&edges)
    }

    fn connect_all(&mut self, edges: &[(TaskId, TaskId)]) -> Result<()> {
        let mut added = Vec::with_capacity(edges.len());
        for &(from, to) in edges {
            match self.try_add_edge(from, to) {
                Ok(true) => added.push((from, to)),
                Ok(false) => {}
                Err(e) => {
                    for &(f, t) in added.iter().rev() {
                        self.remove_edge(f, t);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Returns `Ok(false)` when the edge already exists
    fn try_add_edge(&mut self, from: TaskId, to: TaskId) -> Result<bool> {
        if !self.tasks.contains_key(&from) {
            return Err(TaskGraphError::UnknownTask(from.to_string()));
        }
        if !self.tasks.contains_key(&to) {
            return Err(TaskGraphError::UnknownTask(to.to_string()));
        }
        if from == to {
            return Err(TaskGraphError::SelfLoop(self.label_of(from)));
        }
        if self.successor_ids(from).contains(&to) {
            return Ok(false);
        }
        if self.reaches(to, from) {
            return Err(TaskGraphError::CycleDetected {
                from: self.label_of(from),
                to: self.label_of(to),
            });
        }
        self.successors.entry(from).or_default().push(to);
        self.predecessors.entry(to).or_default().push(from);
        self.edge_count += 1;
        Ok(true)
    }

    fn remove_edge(&mut self, from: TaskId, to: TaskId) {
        if let Some(succ) = self.successors.get_mut(&from) {
            succ.retain(|&id| id != to);
        }
        if let Some(pred) = self.predecessors.get_mut(&to) {
            pred.retain(|&id| id != from);
        }
        self.edge_count -= 1;
    }

    /// Depth-first search along successor edges and input references
    fn reaches(&self, start: TaskId, target: TaskId) -> bool {
        let referrers = self.referrers();
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if seen.insert(id) {
                stack.extend_from_slice(self.successor_ids(id));
                if let Some(next) = referrers.get(&id) {
                    stack.extend_from_slice(next);
                }
            }
        }
        false
    }
}

impl<V: TaskValue + fmt::Debug> Workflow<V> {
    /// Inspection view: task key to operation label and rendered inputs
    ///
    /// Nothing is executed. Graph predecessors are rendered after the
    /// task's own inputs, mirroring the argument order seen at run time.
    pub fn as_dict(&self) -> IndexMap<String, TaskSummary> {
        self.tasks()
            .map(|task| {
                let mut inputs: Vec<RenderedInput> = task
                    .inputs()
                    .iter()
                    .map(|input| match input {
                        TaskInput::Literal(v) => RenderedInput::Literal(format!("{:?}", v)),
                        TaskInput::Task(id) => RenderedInput::Task(self.label_of(*id)),
                        TaskInput::Tasks(ids) => {
                            RenderedInput::Tasks(ids.iter().map(|id| self.label_of(*id)).collect())
                        }
                    })
                    .collect();
                inputs.extend(
                    self.predecessor_ids(task.id())
                        .iter()
                        .map(|id| RenderedInput::Task(self.label_of(*id))),
                );
                let summary = TaskSummary {
                    operation: task.operation().label().to_string(),
                    inputs,
                };
                (task.key(), summary)
            })
            .collect()
    }
}

impl<V> Clone for Workflow<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            order: self.order.clone(),
            tasks: self.tasks.clone(),
            successors: self.successors.clone(),
            predecessors: self.predecessors.clone(),
            edge_count: self.edge_count,
        }
    }
}

impl<V> Default for Workflow<V> {
    fn default() -> Self {
        Self::new("workflow")
    }
}

impl<V> fmt::Debug for Workflow<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("tasks", &self.order.len())
            .field("edges", &self.edge_count)
            .finish()
    }
}

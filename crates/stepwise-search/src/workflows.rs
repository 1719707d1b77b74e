//! Workflow builders for fitting and for one round of candidate creation

use std::sync::Arc;

use async_trait::async_trait;
use task_graph::{from_fn, Arg, ExecutionContext, Operation, Task, TaskInput, Workflow};

use crate::effects::Effect;
use crate::error::SearchError;
use crate::model::{CandidateModel, ModelToolkit};
use crate::value::{last_arg, SearchValue};

/// Fits the model it receives from its predecessor on the worker pool
pub struct FitOperation<M> {
    toolkit: Arc<dyn ModelToolkit<M>>,
}

impl<M> FitOperation<M> {
    pub fn new(toolkit: Arc<dyn ModelToolkit<M>>) -> Self {
        Self { toolkit }
    }
}

#[async_trait]
impl<M: CandidateModel> Operation<SearchValue<M>> for FitOperation<M> {
    fn label(&self) -> &str {
        "fit"
    }

    async fn call(
        &self,
        args: Vec<Arg<SearchValue<M>>>,
        ctx: &ExecutionContext<SearchValue<M>>,
    ) -> task_graph::Result<SearchValue<M>> {
        let model = last_arg(args)?.into_model()?;
        let toolkit = Arc::clone(&self.toolkit);
        log::debug!("Fitting model '{}' in '{}'", model.name(), ctx.execution_name());

        ctx.run_blocking(move || {
            let fitted = toolkit.fit(model);
            if fitted.fit_results().is_none() {
                log::warn!("Fit of model '{}' produced no results", fitted.name());
            }
            Ok(SearchValue::Model(fitted))
        })
        .await
    }
}

/// Derives a child of the model it receives by adding one covariate effect
///
/// The child is named `"{parent}-{index}"`.
pub struct AddEffectOperation<M> {
    toolkit: Arc<dyn ModelToolkit<M>>,
    effect: Effect,
    index: usize,
}

impl<M> AddEffectOperation<M> {
    pub fn new(toolkit: Arc<dyn ModelToolkit<M>>, effect: Effect, index: usize) -> Self {
        Self {
            toolkit,
            effect,
            index,
        }
    }
}

impl<M: CandidateModel> AddEffectOperation<M> {
    fn derive(&self, parent: &M) -> Result<M, SearchError> {
        let mut child = self
            .toolkit
            .copy_model(parent, &format!("{}-{}", parent.name(), self.index))?;

        let origin = if parent.description().is_empty() {
            parent.name()
        } else {
            parent.description()
        };
        child.set_description(format!("add_covariate_effect(<{}>, {})", origin, self.effect));
        child.set_parent_model(parent.name().to_string());

        self.toolkit.update_initial_estimates(&mut child)?;
        self.toolkit.add_covariate_effect(&mut child, &self.effect)?;
        Ok(child)
    }
}

#[async_trait]
impl<M: CandidateModel> Operation<SearchValue<M>> for AddEffectOperation<M> {
    fn label(&self) -> &str {
        "add_covariate_effect"
    }

    async fn call(
        &self,
        args: Vec<Arg<SearchValue<M>>>,
        _ctx: &ExecutionContext<SearchValue<M>>,
    ) -> task_graph::Result<SearchValue<M>> {
        let parent = last_arg(args)?.into_model()?;
        Ok(SearchValue::Model(self.derive(&parent)?))
    }
}

/// Workflow of `n` independent fit tasks
///
/// Each task fits the model produced by its predecessor, so the workflow
/// is meant to be inserted after tasks that produce models.
pub fn create_fit_workflow<M: CandidateModel>(
    toolkit: Arc<dyn ModelToolkit<M>>,
    n: usize,
) -> Workflow<SearchValue<M>> {
    let operation: Arc<dyn Operation<SearchValue<M>>> = Arc::new(FitOperation::new(toolkit));
    let tasks = (0..n).map(|_| Task::from_shared("run", Arc::clone(&operation), Vec::new()));
    Workflow::with_tasks("modelfit", tasks)
}

/// Task collecting the models of all its predecessors, in order
pub fn gather_task<M: CandidateModel>() -> Task<SearchValue<M>> {
    Task::new(
        "gather",
        from_fn("gather", |args: Vec<Arg<SearchValue<M>>>| {
            let models = args
                .into_iter()
                .map(|arg| Ok(arg.into_value()?.into_model()?))
                .collect::<Result<Vec<M>, SearchError>>()?;
            Ok(SearchValue::Models(models))
        }),
        Vec::new(),
    )
}

/// One search round: a branch per effect, fitted, gathered in effect order
pub fn effects_addition_workflow<M: CandidateModel>(
    toolkit: Arc<dyn ModelToolkit<M>>,
    model: &M,
    effects: &[Effect],
) -> task_graph::Result<Workflow<SearchValue<M>>> {
    let mut wf = Workflow::new("effects_addition");
    for (i, effect) in effects.iter().enumerate() {
        wf.add_task(Task::new(
            effect.to_string(),
            AddEffectOperation::new(Arc::clone(&toolkit), effect.clone(), i + 1),
            vec![TaskInput::Literal(SearchValue::Model(model.clone()))],
        ));
    }

    let fits = create_fit_workflow(toolkit, effects.len());
    wf.insert_workflow(&fits, None)?;

    let leaves = wf.leaf_tasks();
    wf.add_task_after(gather_task(), &leaves)?;
    Ok(wf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{handle, MockModel, MockToolkit};

    fn effects() -> Vec<Effect> {
        vec![
            "CL, WGT, exp".parse().unwrap(),
            "V, WGT, exp".parse().unwrap(),
            "CL, APGR, exp".parse().unwrap(),
        ]
    }

    #[test]
    fn test_create_fit_workflow() {
        let wf = create_fit_workflow(MockToolkit::new(100.0).shared(), 3);
        assert_eq!(wf.len(), 3);
        assert_eq!(wf.edge_count(), 0);
        assert_eq!(wf.leaf_tasks().len(), 3);
        assert!(wf.as_dict().values().all(|summary| summary.operation == "fit"));
    }

    #[test]
    fn test_effects_addition_structure() {
        let model = MockModel::fitted("run1", 3, 100.0);
        let wf = effects_addition_workflow(MockToolkit::new(100.0).shared(), &model, &effects()).unwrap();

        // One branch of two tasks per effect plus the gather task
        assert_eq!(wf.len(), 7);
        assert_eq!(wf.edge_count(), 6);
        let leaves = wf.leaf_tasks();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].name(), "gather");

        let sources: Vec<String> = wf.source_tasks().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(sources, vec!["CL, WGT, exp, *", "V, WGT, exp, *", "CL, APGR, exp, *"]);
        // Every source feeds exactly one fit
        for source in wf.source_tasks() {
            assert_eq!(wf.successors(&source).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_effects_addition_execution() {
        let toolkit = MockToolkit::new(100.0)
            .with_gain("CL", "WGT", 12.0)
            .with_gain("V", "WGT", 2.0);
        let fits = toolkit.fit_counter();
        let parent = MockModel::fitted("run1", 3, 100.0).with_description("base");

        let wf = effects_addition_workflow(toolkit.shared(), &parent, &effects()).unwrap();
        let mut outputs = handle().execute(wf).await.unwrap();
        assert_eq!(outputs.len(), 1);
        let models = outputs.pop().unwrap().into_models().unwrap();

        let names: Vec<&str> = models.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["run1-1", "run1-2", "run1-3"]);
        assert_eq!(models[0].description(), "add_covariate_effect(<base>, CL, WGT, exp, *)");
        assert!(models.iter().all(|m| m.parent_model() == Some("run1")));
        assert!(models.iter().all(|m| m.parameter_count() == 4));
        assert_eq!(models[0].ofv(), 88.0);
        assert_eq!(models[1].ofv(), 98.0);
        assert_eq!(models[2].ofv(), 100.0);
        assert_eq!(fits.load(std::sync::atomic::Ordering::SeqCst), 3);
        // The parent is never mutated
        assert_eq!(parent.parameter_count(), 3);
    }

    #[tokio::test]
    async fn test_description_falls_back_to_name() {
        let parent = MockModel::fitted("run1", 3, 100.0);
        let wf = effects_addition_workflow(MockToolkit::new(100.0).shared(), &parent, &effects()[..1])
            .unwrap();
        let models = handle().execute(wf).await.unwrap().pop().unwrap().into_models().unwrap();
        assert_eq!(models[0].description(), "add_covariate_effect(<run1>, CL, WGT, exp, *)");
    }
}

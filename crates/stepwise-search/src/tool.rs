//! Tool entry points
//!
//! The tool workflow is `init` → (fit, if the input model has no fit
//! results) → `search` → `results`. Its single output is the
//! [`CovsearchResults`] of the run.

use std::sync::Arc;

use task_graph::{from_fn, Arg, ExecutionHandle, LogEventSink, Task, TaskInput, Workflow};

use crate::config::SearchConfig;
use crate::effects::{expand_effects, EffectSpec};
use crate::error::{Result, SearchError};
use crate::lrt::{Lrt, ModelSelection};
use crate::model::{CandidateModel, ModelToolkit};
use crate::results::{CovsearchResults, ResultsOperation};
use crate::search::{ForwardSearch, NAME_WF};
use crate::value::{last_arg, SearchValue};
use crate::workflows::create_fit_workflow;

/// Build the tool workflow without running it
///
/// Without a model, `init` passes on whatever its predecessor produces, so
/// the workflow can be inserted after another tool.
pub fn create_workflow<M: CandidateModel>(
    model: Option<M>,
    effects: &[EffectSpec],
    config: &SearchConfig,
    toolkit: Arc<dyn ModelToolkit<M>>,
    selection: Arc<dyn ModelSelection<M>>,
) -> Result<Workflow<SearchValue<M>>> {
    config.validate()?;
    let effects = expand_effects(effects)?;
    log::debug!(
        "Creating {} workflow: {} with {} effects (p_forward = {})",
        NAME_WF,
        config.algorithm,
        effects.len(),
        config.p_forward
    );

    let needs_fit = model.as_ref().is_some_and(|m| m.fit_results().is_none());
    let inputs = match model {
        Some(model) => vec![TaskInput::Literal(SearchValue::Model(model))],
        None => Vec::new(),
    };

    let mut wf = Workflow::new(NAME_WF);
    wf.add_task(Task::new(
        "init",
        from_fn("init", |args: Vec<Arg<SearchValue<M>>>| Ok(last_arg(args)?)),
        inputs,
    ));

    if needs_fit {
        wf.insert_workflow(&create_fit_workflow(Arc::clone(&toolkit), 1), None)?;
    }

    let search = ForwardSearch::new(toolkit, Arc::clone(&selection), effects, config.p_forward)
        .with_max_steps(config.max_steps);
    let leaves = wf.leaf_tasks();
    wf.add_task_after(Task::new("search", search, Vec::new()), &leaves)?;

    let leaves = wf.leaf_tasks();
    wf.add_task_after(
        Task::new(
            "results",
            ResultsOperation::new(selection, config.p_forward),
            Vec::new(),
        ),
        &leaves,
    )?;

    Ok(wf)
}

/// Run a covariate search with the likelihood-ratio test on a new scheduler
pub async fn run_covsearch<M: CandidateModel>(
    model: M,
    effects: &[EffectSpec],
    config: SearchConfig,
    toolkit: Arc<dyn ModelToolkit<M>>,
) -> Result<CovsearchResults<M>> {
    let handle = ExecutionHandle::spawn(config.executor.clone(), Arc::new(LogEventSink));
    run_covsearch_with(&handle, model, effects, &config, toolkit, Arc::new(Lrt)).await
}

/// Run a covariate search on an existing scheduler
pub async fn run_covsearch_with<M: CandidateModel>(
    handle: &ExecutionHandle<SearchValue<M>>,
    model: M,
    effects: &[EffectSpec],
    config: &SearchConfig,
    toolkit: Arc<dyn ModelToolkit<M>>,
    selection: Arc<dyn ModelSelection<M>>,
) -> Result<CovsearchResults<M>> {
    let wf = create_workflow(Some(model), effects, config, toolkit, selection)?;
    let mut outputs = handle.execute(wf).await?;
    let output = outputs.pop().ok_or_else(|| {
        SearchError::model(format!("{NAME_WF} workflow produced no output"))
    })?;
    output.into_results()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::effects::{EffectOperation, FunctionalForm};
    use crate::testing::{handle, MockModel, MockToolkit};

    fn spec(parameters: &[&str], covariates: &[&str]) -> EffectSpec {
        EffectSpec::new(
            parameters.iter().copied(),
            covariates.iter().copied(),
            [FunctionalForm::Exponential],
            EffectOperation::Multiplicative,
        )
    }

    fn task_names(wf: &Workflow<SearchValue<MockModel>>) -> Vec<String> {
        wf.tasks().map(|t| t.name().to_string()).collect()
    }

    #[test]
    fn test_create_workflow_fitted_input() {
        let wf = create_workflow(
            Some(MockModel::fitted("run1", 3, 100.0)),
            &[spec(&["CL"], &["WGT"])],
            &SearchConfig::default(),
            MockToolkit::new(100.0).shared(),
            Arc::new(Lrt),
        )
        .unwrap();

        assert_eq!(task_names(&wf), vec!["init", "search", "results"]);
        assert_eq!(wf.edge_count(), 2);
        assert_eq!(wf.leaf_tasks()[0].name(), "results");
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn test_create_workflow_fits_unfitted_input() {
        let wf = create_workflow(
            Some(MockModel::unfitted("run1", 3)),
            &[spec(&["CL"], &["WGT"])],
            &SearchConfig::default(),
            MockToolkit::new(100.0).shared(),
            Arc::new(Lrt),
        )
        .unwrap();

        assert_eq!(task_names(&wf), vec!["init", "run", "search", "results"]);
        let labels: Vec<String> = wf.as_dict().values().map(|s| s.operation.clone()).collect();
        assert_eq!(labels, vec!["init", "fit", "greedy_forward_search", "results"]);
    }

    #[test]
    fn test_create_workflow_without_model() {
        let wf = create_workflow::<MockModel>(
            None,
            &[spec(&["CL"], &["WGT"])],
            &SearchConfig::default(),
            MockToolkit::new(100.0).shared(),
            Arc::new(Lrt),
        )
        .unwrap();
        assert_eq!(task_names(&wf), vec!["init", "search", "results"]);
        assert!(wf.tasks().next().unwrap().inputs().is_empty());
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let model = MockModel::fitted("run1", 3, 100.0);
        let err = create_workflow(
            Some(model.clone()),
            &[spec(&["CL"], &["WGT"])],
            &SearchConfig::default().with_p_forward(0.0),
            MockToolkit::new(100.0).shared(),
            Arc::new(Lrt),
        )
        .unwrap_err();
        assert!(matches!(err, SearchError::InvalidAlpha(_)));

        let err = create_workflow(
            Some(model),
            &[spec(&[], &["WGT"])],
            &SearchConfig::default(),
            MockToolkit::new(100.0).shared(),
            Arc::new(Lrt),
        )
        .unwrap_err();
        assert!(matches!(err, SearchError::InvalidEffect(_)));
    }

    #[tokio::test]
    async fn test_run_covsearch_end_to_end() {
        let toolkit = MockToolkit::new(100.0)
            .with_gain("CL", "WGT", 10.0)
            .with_gain("V", "WGT", 1.0);
        let fits = toolkit.fit_counter();

        let results = run_covsearch_with(
            &handle(),
            MockModel::unfitted("run1", 3),
            &[spec(&["CL", "V"], &["WGT"])],
            &SearchConfig::default(),
            toolkit.shared(),
            Arc::new(Lrt),
        )
        .await
        .unwrap();

        // Input fit, two candidates in round one, one in round two
        assert_eq!(fits.load(Ordering::SeqCst), 4);
        assert_eq!(results.input_model.name(), "run1");
        assert_eq!(results.input_model.ofv(), 100.0);
        assert_eq!(results.final_model.name(), "run1-1");
        assert_eq!(results.candidates.len(), 4);
        assert_eq!(results.steps.len(), 3);

        let selected: Vec<&str> = results
            .steps
            .iter()
            .filter(|r| r.selected)
            .map(|r| r.model.as_str())
            .collect();
        assert_eq!(selected, vec!["run1-1"]);
        assert_eq!(results.ofv_summary.len(), 2);
    }

    #[tokio::test]
    async fn test_run_covsearch_default_scheduler() {
        let config = tokio_test::assert_ok!(SearchConfig::from_json(
            r#"{"p_forward": 0.01, "executor": {"max_workers": 1}}"#
        ));
        let results = run_covsearch(
            MockModel::fitted("run1", 3, 100.0),
            &[spec(&["CL"], &["WGT", "AGE"])],
            config,
            MockToolkit::new(100.0).with_gain("CL", "AGE", 20.0).shared(),
        )
        .await
        .unwrap();

        assert_eq!(results.final_model.name(), "run1-2");
        let effects: Vec<String> = results.selected_effects().iter().map(ToString::to_string).collect();
        assert_eq!(effects, vec!["CL, AGE, exp, *"]);
        assert!(results.steps.iter().all(|r| r.goal_pvalue == 0.01));
    }
}

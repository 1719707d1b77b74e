//! Greedy forward search over covariate effects
//!
//! Each round builds one candidate per remaining effect on top of the best
//! model so far, runs the batch as a nested workflow, and keeps the most
//! significant improvement. The search ends when no candidate beats its
//! parent, when the effects run out, or when the round limit is reached.

use std::sync::Arc;

use async_trait::async_trait;
use task_graph::{Arg, ExecutionContext, Operation, TaskGraphError};

use crate::candidate::{Candidate, Step};
use crate::effects::Effect;
use crate::lrt::ModelSelection;
use crate::model::{CandidateModel, ModelToolkit};
use crate::value::{last_arg, SearchValue};
use crate::workflows::effects_addition_workflow;

/// Name prefix of the tool workflow and its nested executions
pub const NAME_WF: &str = "covsearch";

/// Search task; receives the start model from its predecessor and yields
/// every candidate created, the start candidate first
pub struct ForwardSearch<M> {
    toolkit: Arc<dyn ModelToolkit<M>>,
    selection: Arc<dyn ModelSelection<M>>,
    effects: Vec<Effect>,
    p_forward: f64,
    max_steps: Option<usize>,
}

impl<M: CandidateModel> ForwardSearch<M> {
    pub fn new(
        toolkit: Arc<dyn ModelToolkit<M>>,
        selection: Arc<dyn ModelSelection<M>>,
        effects: Vec<Effect>,
        p_forward: f64,
    ) -> Self {
        Self {
            toolkit,
            selection,
            effects,
            p_forward,
            max_steps: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub async fn run(
        &self,
        model: M,
        ctx: &ExecutionContext<SearchValue<M>>,
    ) -> task_graph::Result<Vec<Candidate<M>>> {
        let mut best = Candidate::start(model);
        let mut remaining = self.effects.clone();
        let mut all = vec![best.clone()];
        let total = remaining.len().max(1);

        let mut step = 1;
        while !remaining.is_empty() {
            if self.max_steps.is_some_and(|max| step > max) {
                log::info!("Stopping search: reached the limit of {} steps", step - 1);
                break;
            }

            log::debug!(
                "Round {}: testing {} effects on '{}'",
                step,
                remaining.len(),
                best.model.name()
            );
            let wf = effects_addition_workflow(Arc::clone(&self.toolkit), &best.model, &remaining)?;
            let name = format!("{NAME_WF}-effects_addition-{step}");
            let models = ctx
                .call_workflow(wf, name)
                .await?
                .pop()
                .ok_or_else(|| TaskGraphError::failed("candidate batch returned no output"))
                .and_then(|value| Ok(value.into_models()?))?;

            if models.len() != remaining.len() {
                return Err(TaskGraphError::failed(format!(
                    "expected {} candidates, got {}",
                    remaining.len(),
                    models.len()
                )));
            }

            let winner = self
                .selection
                .best_of_many(&best.model, &models, self.p_forward);

            let children: Vec<Candidate<M>> = models
                .into_iter()
                .zip(&remaining)
                .map(|(model, effect)| best.extend(model, Step::forward(self.p_forward, effect.clone())))
                .collect();
            all.extend(children.iter().cloned());

            let Some(index) = winner else {
                log::info!(
                    "Round {}: no candidate improves significantly on '{}'",
                    step,
                    best.model.name()
                );
                break;
            };

            best = children[index].clone();
            if let Some(added) = best.last_step().map(|s| s.effect.clone()) {
                log::info!("Round {}: selected '{}' ({})", step, best.model.name(), added);
                remaining.retain(|effect| !effect.same_target(&added));
            }

            ctx.report_progress(
                1.0 - remaining.len() as f32 / total as f32,
                Some(format!("step {step}: selected {}", best.model.name())),
            );
            step += 1;
        }

        Ok(all)
    }
}

#[async_trait]
impl<M: CandidateModel> Operation<SearchValue<M>> for ForwardSearch<M> {
    fn label(&self) -> &str {
        "greedy_forward_search"
    }

    async fn call(
        &self,
        args: Vec<Arg<SearchValue<M>>>,
        ctx: &ExecutionContext<SearchValue<M>>,
    ) -> task_graph::Result<SearchValue<M>> {
        let model = last_arg(args)?.into_model()?;
        let candidates = self.run(model, ctx).await?;
        Ok(SearchValue::Candidates(candidates))
    }
}

//! Result tables of a covariate search

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use task_graph::{Arg, ExecutionContext, Operation};

use crate::candidate::Candidate;
use crate::effects::Effect;
use crate::error::{Result, SearchError};
use crate::lrt::{degrees_of_freedom, ofv_drop, ModelSelection};
use crate::model::CandidateModel;
use crate::value::{last_arg, SearchValue};

/// One row per tested candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRow {
    pub step: usize,
    pub parameter: String,
    pub covariate: String,
    pub extended_state: String,
    pub reduced_ofv: f64,
    pub extended_ofv: f64,
    pub ofv_drop: f64,
    pub delta_df: Option<i64>,
    pub pvalue: f64,
    pub goal_pvalue: f64,
    pub is_backward: bool,
    pub extended_significant: bool,
    pub selected: bool,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummaryRow {
    pub model: String,
    pub parent: Option<String>,
    pub step: usize,
    pub description: String,
    pub ofv: f64,
    pub dofv: f64,
    pub pvalue: f64,
    pub selected: bool,
}

/// Ofv along the selected path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfvSummaryRow {
    pub step: usize,
    pub model: String,
    pub ofv: f64,
    pub ofv_drop: f64,
    pub pvalue: f64,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummaryRow {
    pub model: String,
    pub description: String,
    pub parent: Option<String>,
    pub parameters: usize,
    pub ofv: f64,
    pub bic: Option<f64>,
    pub minimization_successful: Option<bool>,
    /// Ofv drop relative to the input model
    pub dofv: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Messages about the run, kept with the results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        self.entries.push(LogEntry {
            level: LogLevel::Info,
            message,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.entries.push(LogEntry {
            level: LogLevel::Warning,
            message,
        });
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.level == LogLevel::Warning)
    }
}

/// Everything a covariate search produced
#[derive(Debug, Clone)]
pub struct CovsearchResults<M> {
    /// Best model of the search tree
    pub final_model: M,
    pub input_model: M,
    /// Every candidate, the input model first
    pub candidates: Vec<Candidate<M>>,
    pub steps: Vec<StepRow>,
    pub candidate_summary: Vec<CandidateSummaryRow>,
    pub ofv_summary: Vec<OfvSummaryRow>,
    /// Every model ranked by bic when all fitted models have one, otherwise
    /// by ofv; unfitted models last
    pub model_summary: Vec<ModelSummaryRow>,
    pub log: RunLog,
}

impl<M: CandidateModel> CovsearchResults<M> {
    /// Build the tables from the candidates of a search
    pub fn summarize(
        candidates: Vec<Candidate<M>>,
        alpha: f64,
        selection: &dyn ModelSelection<M>,
    ) -> Result<Self> {
        let Some(start) = candidates.first() else {
            return Err(SearchError::model("no candidates to summarize"));
        };
        let input_model = start.model.clone();
        let mut log = RunLog::default();

        let models: Vec<M> = candidates.iter().skip(1).map(|c| c.model.clone()).collect();
        let final_model = selection
            .best_of_subtree(&input_model, &models, alpha)
            .clone();

        let by_name: IndexMap<&str, &M> = candidates
            .iter()
            .map(|c| (c.model.name(), &c.model))
            .collect();
        let mut children: HashMap<&str, usize> = HashMap::new();
        for candidate in &candidates {
            if let Some(parent) = candidate.model.parent_model() {
                *children.entry(parent).or_default() += 1;
            }
        }
        let is_selected = |model: &M| {
            children.get(model.name()).copied().unwrap_or(0) >= 1
                || model.name() == final_model.name()
        };

        let mut steps = Vec::new();
        let mut candidate_summary = Vec::new();
        for candidate in candidates.iter().filter(|c| !c.is_start()) {
            let Some(last) = candidate.last_step() else {
                continue;
            };
            let model = &candidate.model;
            let parent = model.parent_model().and_then(|name| by_name.get(name).copied());
            if parent.is_none() {
                log.warn(format!(
                    "Parent of model '{}' could not be resolved",
                    model.name()
                ));
            }
            if model.fit_results().is_none() {
                log.warn(format!("Model '{}' has no fit results", model.name()));
            }

            let pvalue = parent.map_or(f64::NAN, |p| selection.p_value(p, model));
            let dofv = parent.map_or(f64::NAN, |p| ofv_drop(p, model));
            let extended_significant = pvalue <= last.alpha;
            let selected = is_selected(model);
            if selected && !extended_significant {
                log.warn(format!(
                    "Model '{}' is selected but not significant (p = {})",
                    model.name(),
                    pvalue
                ));
            }

            steps.push(StepRow {
                step: candidate.steps.len(),
                parameter: last.effect.parameter.clone(),
                covariate: last.effect.covariate.clone(),
                extended_state: last.effect.state(),
                reduced_ofv: parent.map_or(f64::NAN, |p| p.ofv()),
                extended_ofv: model.ofv(),
                ofv_drop: dofv,
                delta_df: parent.map(|p| degrees_of_freedom(p, model)),
                pvalue,
                goal_pvalue: last.alpha,
                is_backward: last.is_backward(),
                extended_significant,
                selected,
                model: model.name().to_string(),
            });
            candidate_summary.push(CandidateSummaryRow {
                model: model.name().to_string(),
                parent: model.parent_model().map(str::to_string),
                step: candidate.steps.len(),
                description: model.description().to_string(),
                ofv: model.ofv(),
                dofv,
                pvalue,
                selected,
            });
        }

        let ofv_summary = ofv_summary(&candidates, &final_model, selection);
        let model_summary = model_summary(&candidates, &input_model);

        log.info(format!(
            "Search finished with {} candidates; final model '{}'",
            candidates.len(),
            final_model.name()
        ));

        Ok(Self {
            final_model,
            input_model,
            candidates,
            steps,
            candidate_summary,
            ofv_summary,
            model_summary,
            log,
        })
    }

    /// Effects added on the way to the final model
    pub fn selected_effects(&self) -> Vec<Effect> {
        self.candidates
            .iter()
            .find(|c| c.model.name() == self.final_model.name())
            .map(|c| c.steps.iter().map(|s| s.effect.clone()).collect())
            .unwrap_or_default()
    }

    /// Models of all candidates except the input model
    pub fn models(&self) -> impl Iterator<Item = &M> {
        self.candidates.iter().filter(|c| !c.is_start()).map(|c| &c.model)
    }

    /// The tables as one JSON document
    pub fn tables_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "final_model": self.final_model.name(),
            "input_model": self.input_model.name(),
            "steps": serde_json::to_value(&self.steps)?,
            "candidate_summary": serde_json::to_value(&self.candidate_summary)?,
            "ofv_summary": serde_json::to_value(&self.ofv_summary)?,
            "model_summary": serde_json::to_value(&self.model_summary)?,
            "log": serde_json::to_value(&self.log)?,
        }))
    }
}

/// Input model, then the model chosen at each step up to the final model
fn ofv_summary<M: CandidateModel>(
    candidates: &[Candidate<M>],
    final_model: &M,
    selection: &dyn ModelSelection<M>,
) -> Vec<OfvSummaryRow> {
    let Some(final_candidate) = candidates
        .iter()
        .find(|c| c.model.name() == final_model.name())
    else {
        return Vec::new();
    };

    // Walk parent links back from the final model
    let mut path = vec![final_candidate];
    while let Some(parent) = path
        .last()
        .and_then(|c| c.model.parent_model())
        .and_then(|name| candidates.iter().find(|c| c.model.name() == name))
    {
        if path.len() > candidates.len() {
            break;
        }
        path.push(parent);
    }
    path.reverse();

    let mut rows = Vec::with_capacity(path.len());
    let mut previous: Option<&M> = None;
    for candidate in path {
        let model = &candidate.model;
        rows.push(OfvSummaryRow {
            step: candidate.steps.len(),
            model: model.name().to_string(),
            ofv: model.ofv(),
            ofv_drop: previous.map_or(f64::NAN, |p| ofv_drop(p, model)),
            pvalue: previous.map_or(f64::NAN, |p| selection.p_value(p, model)),
            is_final: model.name() == final_model.name(),
        });
        previous = Some(model);
    }
    rows
}

fn model_summary<M: CandidateModel>(candidates: &[Candidate<M>], input: &M) -> Vec<ModelSummaryRow> {
    let mut rows: Vec<ModelSummaryRow> = candidates
        .iter()
        .map(|c| {
            let model = &c.model;
            let fit = model.fit_results();
            ModelSummaryRow {
                model: model.name().to_string(),
                description: model.description().to_string(),
                parent: model.parent_model().map(str::to_string),
                parameters: model.parameter_count(),
                ofv: model.ofv(),
                bic: fit.and_then(|f| f.bic),
                minimization_successful: fit.map(|f| f.minimization_successful),
                dofv: input.ofv() - model.ofv(),
            }
        })
        .collect();

    let fitted = || rows.iter().filter(|r| !r.ofv.is_nan());
    let by_bic = fitted().next().is_some() && fitted().all(|r| r.bic.is_some());
    let rank = |row: &ModelSummaryRow| match row.bic {
        Some(bic) if by_bic && !row.ofv.is_nan() => bic,
        _ => row.ofv,
    };
    rows.sort_by(|a, b| {
        let (a, b) = (rank(a), rank(b));
        a.is_nan().cmp(&b.is_nan()).then(a.total_cmp(&b))
    });
    rows
}

/// Final task of the tool workflow: turns candidates into results
pub struct ResultsOperation<M> {
    selection: Arc<dyn ModelSelection<M>>,
    p_forward: f64,
}

impl<M> ResultsOperation<M> {
    pub fn new(selection: Arc<dyn ModelSelection<M>>, p_forward: f64) -> Self {
        Self {
            selection,
            p_forward,
        }
    }
}

#[async_trait]
impl<M: CandidateModel> Operation<SearchValue<M>> for ResultsOperation<M> {
    fn label(&self) -> &str {
        "results"
    }

    async fn call(
        &self,
        args: Vec<Arg<SearchValue<M>>>,
        _ctx: &ExecutionContext<SearchValue<M>>,
    ) -> task_graph::Result<SearchValue<M>> {
        let candidates = last_arg(args)?.into_candidates()?;
        let results = CovsearchResults::summarize(candidates, self.p_forward, self.selection.as_ref())?;
        Ok(SearchValue::Results(Box::new(results)))
    }
}

//! Stepwise covariate search
//!
//! Greedy forward selection of covariate effects for a statistical model.
//! Every round is expressed as a [`task_graph::Workflow`]: one branch per
//! candidate effect (copy the current best model, add the effect, fit),
//! gathered and ranked with a likelihood-ratio test.
//!
//! The model itself is opaque. Callers provide it through the
//! [`CandidateModel`] and [`ModelToolkit`] traits; ranking goes through
//! [`ModelSelection`], with [`Lrt`] as the default.
//!
//! ```ignore
//! let results = run_covsearch(
//!     model,
//!     &[EffectSpec::new(["CL", "V"], ["WGT", "AGE"], [FunctionalForm::Exponential], EffectOperation::Multiplicative)],
//!     SearchConfig::default(),
//!     toolkit,
//! )
//! .await?;
//! println!("{}", results.final_model.name());
//! ```

pub mod candidate;
pub mod config;
pub mod effects;
pub mod error;
pub mod lrt;
pub mod model;
pub mod results;
pub mod search;
pub mod tool;
pub mod value;
pub mod workflows;

#[cfg(test)]
pub(crate) mod testing;

pub use candidate::{Candidate, Step, StepDirection};
pub use config::{Algorithm, SearchConfig};
pub use effects::{expand_effects, Effect, EffectOperation, EffectSpec, FunctionalForm};
pub use error::{Result, SearchError};
pub use lrt::{Lrt, ModelSelection};
pub use model::{CandidateModel, FitResults, ModelToolkit};
pub use results::{
    CandidateSummaryRow, CovsearchResults, LogEntry, LogLevel, ModelSummaryRow, OfvSummaryRow,
    RunLog, StepRow,
};
pub use search::{ForwardSearch, NAME_WF};
pub use tool::{create_workflow, run_covsearch, run_covsearch_with};
pub use value::SearchValue;
pub use workflows::{create_fit_workflow, effects_addition_workflow, gather_task};

//! Interfaces to the model collaborator
//!
//! The search never inspects model internals. It reads a few properties
//! through [`CandidateModel`] and changes models only through a
//! [`ModelToolkit`].

use serde::{Deserialize, Serialize};

use crate::effects::Effect;
use crate::error::Result;

/// Outcome of fitting a model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitResults {
    /// Objective function value (-2 log likelihood)
    pub ofv: f64,
    pub minimization_successful: bool,
    pub bic: Option<f64>,
}

impl FitResults {
    pub fn new(ofv: f64, minimization_successful: bool) -> Self {
        Self {
            ofv,
            minimization_successful,
            bic: None,
        }
    }

    /// Whether the result can take part in a likelihood-ratio test
    pub fn is_rankable(&self) -> bool {
        self.ofv.is_finite()
    }
}

/// Read access to a model, plus the provenance fields the search sets
pub trait CandidateModel: Clone + Send + Sync + 'static {
    /// Unique model name
    fn name(&self) -> &str;

    /// Free-text description; may be empty
    fn description(&self) -> &str;

    fn set_description(&mut self, description: String);

    /// Name of the model this one was derived from
    fn parent_model(&self) -> Option<&str>;

    fn set_parent_model(&mut self, parent: String);

    /// Number of estimated parameters
    fn parameter_count(&self) -> usize;

    /// Fit results, absent if the model was never fitted or the fit crashed
    fn fit_results(&self) -> Option<&FitResults>;

    /// Objective function value, NaN when unavailable
    fn ofv(&self) -> f64 {
        self.fit_results().map_or(f64::NAN, |r| r.ofv)
    }
}

/// Operations on models provided by the modelling layer
///
/// `fit` may block for a long time; the engine runs it on its worker pool.
pub trait ModelToolkit<M>: Send + Sync + 'static {
    /// Deep copy under a new name
    fn copy_model(&self, model: &M, name: &str) -> Result<M>;

    /// Replace initial estimates with the final estimates of the last fit
    fn update_initial_estimates(&self, model: &mut M) -> Result<()>;

    /// Add a covariate effect to the model
    fn add_covariate_effect(&self, model: &mut M, effect: &Effect) -> Result<()>;

    /// Fit the model; a failed fit is reported through the returned model
    fn fit(&self, model: M) -> M;
}

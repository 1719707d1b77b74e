//! Mock model layer shared by the tests of this crate

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use task_graph::{ExecutionHandle, ExecutorConfig, NullEventSink};

use crate::effects::Effect;
use crate::error::{Result, SearchError};
use crate::model::{CandidateModel, FitResults, ModelToolkit};
use crate::value::SearchValue;

#[derive(Debug, Clone, PartialEq)]
pub struct MockModel {
    name: String,
    description: String,
    parent: Option<String>,
    parameters: usize,
    effects: Vec<Effect>,
    fit: Option<FitResults>,
}

impl MockModel {
    pub fn unfitted(name: &str, parameters: usize) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            parent: None,
            parameters,
            effects: Vec::new(),
            fit: None,
        }
    }

    pub fn fitted(name: &str, parameters: usize, ofv: f64) -> Self {
        Self {
            fit: Some(FitResults::new(ofv, true)),
            ..Self::unfitted(name, parameters)
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn with_bic(mut self, bic: f64) -> Self {
        if let Some(fit) = self.fit.as_mut() {
            fit.bic = Some(bic);
        }
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }
}

impl CandidateModel for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn set_description(&mut self, description: String) {
        self.description = description;
    }

    fn parent_model(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    fn set_parent_model(&mut self, parent: String) {
        self.parent = Some(parent);
    }

    fn parameter_count(&self) -> usize {
        self.parameters
    }

    fn fit_results(&self) -> Option<&FitResults> {
        self.fit.as_ref()
    }
}

/// Fits to `base_ofv` minus the gain of every effect the model carries
pub struct MockToolkit {
    base_ofv: f64,
    gains: HashMap<(String, String), f64>,
    failing: Vec<(String, String)>,
    rejected: Vec<(String, String)>,
    fits: Arc<AtomicUsize>,
}

impl MockToolkit {
    pub fn new(base_ofv: f64) -> Self {
        Self {
            base_ofv,
            gains: HashMap::new(),
            failing: Vec::new(),
            rejected: Vec::new(),
            fits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_gain(mut self, parameter: &str, covariate: &str, gain: f64) -> Self {
        self.gains
            .insert((parameter.to_string(), covariate.to_string()), gain);
        self
    }

    /// Fits of models carrying this effect crash
    pub fn with_failure(mut self, parameter: &str, covariate: &str) -> Self {
        self.failing
            .push((parameter.to_string(), covariate.to_string()));
        self
    }

    /// Adding this effect to a model returns an error
    pub fn with_rejected(mut self, parameter: &str, covariate: &str) -> Self {
        self.rejected
            .push((parameter.to_string(), covariate.to_string()));
        self
    }

    pub fn fit_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fits)
    }

    pub fn shared(self) -> Arc<dyn ModelToolkit<MockModel>> {
        Arc::new(self)
    }
}

impl ModelToolkit<MockModel> for MockToolkit {
    fn copy_model(&self, model: &MockModel, name: &str) -> Result<MockModel> {
        Ok(MockModel {
            name: name.to_string(),
            fit: None,
            ..model.clone()
        })
    }

    fn update_initial_estimates(&self, _model: &mut MockModel) -> Result<()> {
        Ok(())
    }

    fn add_covariate_effect(&self, model: &mut MockModel, effect: &Effect) -> Result<()> {
        if self
            .rejected
            .iter()
            .any(|(p, c)| *p == effect.parameter && *c == effect.covariate)
        {
            return Err(SearchError::model(format!(
                "cannot add {} to model '{}'",
                effect, model.name
            )));
        }
        if model.effects.contains(effect) {
            return Err(SearchError::model(format!(
                "model '{}' already has effect {}",
                model.name, effect
            )));
        }
        model.effects.push(effect.clone());
        model.parameters += 1;
        Ok(())
    }

    fn fit(&self, mut model: MockModel) -> MockModel {
        self.fits.fetch_add(1, Ordering::SeqCst);
        let crashed = model.effects.iter().any(|e| {
            self.failing
                .iter()
                .any(|(p, c)| *p == e.parameter && *c == e.covariate)
        });
        model.fit = if crashed {
            None
        } else {
            let gain: f64 = model
                .effects
                .iter()
                .filter_map(|e| self.gains.get(&(e.parameter.clone(), e.covariate.clone())))
                .sum();
            Some(FitResults::new(self.base_ofv - gain, true))
        };
        model
    }
}

pub fn handle() -> ExecutionHandle<SearchValue<MockModel>> {
    let _ = env_logger::builder().is_test(true).try_init();
    ExecutionHandle::spawn(
        ExecutorConfig::default().with_max_workers(2),
        Arc::new(NullEventSink),
    )
}

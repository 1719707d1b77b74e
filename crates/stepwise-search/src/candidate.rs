//! Candidates and the steps that produced them

use serde::{Deserialize, Serialize};

use crate::effects::Effect;

/// Direction of a search step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDirection {
    /// The effect was added
    Forward,
    /// The effect was removed
    Backward,
}

/// One decision of the search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub direction: StepDirection,
    /// Significance level the step was tested at
    pub alpha: f64,
    pub effect: Effect,
}

impl Step {
    pub fn forward(alpha: f64, effect: Effect) -> Self {
        Self {
            direction: StepDirection::Forward,
            alpha,
            effect,
        }
    }

    pub fn backward(alpha: f64, effect: Effect) -> Self {
        Self {
            direction: StepDirection::Backward,
            alpha,
            effect,
        }
    }

    pub fn is_backward(&self) -> bool {
        self.direction == StepDirection::Backward
    }
}

/// A model together with the steps leading to it from the input model
#[derive(Debug, Clone)]
pub struct Candidate<M> {
    pub model: M,
    pub steps: Vec<Step>,
}

impl<M> Candidate<M> {
    /// The unmodified input model
    pub fn start(model: M) -> Self {
        Self {
            model,
            steps: Vec::new(),
        }
    }

    /// A child of this candidate, one step further
    pub fn extend(&self, model: M, step: Step) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.extend(self.steps.iter().cloned());
        steps.push(step);
        Self { model, steps }
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Whether this is the unmodified input model
    pub fn is_start(&self) -> bool {
        self.steps.is_empty()
    }
}

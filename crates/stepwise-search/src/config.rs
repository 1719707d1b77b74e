//! Search configuration

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use task_graph::ExecutorConfig;

use crate::error::{Result, SearchError};

/// Search algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// Greedy forward addition of covariate effects
    #[default]
    #[serde(rename = "scm-forward")]
    ScmForward,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScmForward => "scm-forward",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scm-forward" => Ok(Self::ScmForward),
            other => Err(SearchError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Configuration of one covariate search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Search algorithm
    pub algorithm: Algorithm,
    /// Significance level of the likelihood-ratio test for forward steps
    pub p_forward: f64,
    /// Maximum number of rounds; unlimited when absent
    pub max_steps: Option<usize>,
    /// Scheduler settings used by [`crate::run_covsearch`]
    pub executor: ExecutorConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::ScmForward,
            p_forward: 0.05,
            max_steps: None,
            executor: ExecutorConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_p_forward(mut self, p_forward: f64) -> Self {
        self.p_forward = p_forward;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Reject settings the search cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.p_forward > 0.0 && self.p_forward <= 1.0) {
            return Err(SearchError::InvalidAlpha(self.p_forward));
        }
        Ok(())
    }
}

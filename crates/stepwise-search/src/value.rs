//! Values exchanged between the tasks of a search workflow

use task_graph::Arg;

use crate::candidate::Candidate;
use crate::error::{Result, SearchError};
use crate::results::CovsearchResults;

/// Result of one search task
#[derive(Debug, Clone)]
pub enum SearchValue<M> {
    Model(M),
    Models(Vec<M>),
    Candidates(Vec<Candidate<M>>),
    Results(Box<CovsearchResults<M>>),
}

impl<M> SearchValue<M> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Model(_) => "model",
            Self::Models(_) => "models",
            Self::Candidates(_) => "candidates",
            Self::Results(_) => "results",
        }
    }

    pub fn into_model(self) -> Result<M> {
        match self {
            Self::Model(model) => Ok(model),
            other => Err(other.unexpected("model")),
        }
    }

    pub fn into_models(self) -> Result<Vec<M>> {
        match self {
            Self::Models(models) => Ok(models),
            other => Err(other.unexpected("models")),
        }
    }

    pub fn into_candidates(self) -> Result<Vec<Candidate<M>>> {
        match self {
            Self::Candidates(candidates) => Ok(candidates),
            other => Err(other.unexpected("candidates")),
        }
    }

    pub fn into_results(self) -> Result<CovsearchResults<M>> {
        match self {
            Self::Results(results) => Ok(*results),
            other => Err(other.unexpected("results")),
        }
    }

    fn unexpected(&self, expected: &'static str) -> SearchError {
        SearchError::UnexpectedValue {
            expected,
            found: self.kind(),
        }
    }
}

/// Take the last argument, which is where predecessor results arrive
pub(crate) fn last_arg<M>(mut args: Vec<Arg<SearchValue<M>>>) -> Result<SearchValue<M>> {
    let arg = args.pop().ok_or(SearchError::UnexpectedValue {
        expected: "an input",
        found: "no arguments",
    })?;
    Ok(arg.into_value()?)
}

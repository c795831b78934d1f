//! Umbrella error for callers that handle every stage the same way

use crate::analyzer::SemanticError;
use crate::graph::GraphError;
use crate::interpreter::EvaluationError;
use crate::parser::ParseError;
use crate::types::{HostError, TypeBuildError};

#[derive(Debug, thiserror::Error)]
pub enum DslError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    TypeBuild(#[from] TypeBuildError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl DslError {
    /// Source location, for errors that have one
    pub fn location(&self) -> Option<String> {
        match self {
            DslError::Semantic(err) => Some(err.location().to_string()),
            DslError::Evaluation(err) => err.location().map(ToString::to_string),
            _ => None,
        }
    }
}

pub type DslResult<T> = Result<T, DslError>;

use std::time::Duration;

use thiserror::Error;

use crate::types::FactorKind;

/// Failure reported by an upstream signal source.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed upstream data: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("data fetch failed: {0}")]
    DataFetch(#[from] FetchError),

    #[error("{what} produced {value}, outside [0, 1]")]
    Computation { what: String, value: f64 },
}

impl ScoringError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ScoringError::InvalidInput(message.into())
    }

    pub fn out_of_range(kind: Option<FactorKind>, value: f64) -> Self {
        let what = match kind {
            Some(kind) => format!("factor {kind}"),
            None => "aggregate".to_string(),
        };
        ScoringError::Computation { what, value }
    }
}

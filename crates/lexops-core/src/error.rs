//! Core error types for the LexOps engine.
//!
//! `PipelineError` is what the engine reports about a run or a pipeline
//! definition. `StageError` is what an individual stage returns; the runner
//! converts it into a failed run and never lets it escape to the caller.

use crate::generation::GenerationError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Missing required input fields for stage '{stage}': {}", fields.join(", "))]
    MissingFields { stage: String, fields: Vec<String> },

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Stage '{stage}' broke its contract: {message}")]
    Contract { stage: String, message: String },

    #[error("Invalid pipeline definition: {0}")]
    Build(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pipeline input: {0}")]
    Input(#[from] StateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// The stage this error is attributed to, if any.
    pub fn stage_id(&self) -> Option<&str> {
        match self {
            PipelineError::MissingFields { stage, .. }
            | PipelineError::Stage { stage, .. }
            | PipelineError::Contract { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Errors raised by a stage's own work.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("invalid input '{key}': {message}")]
    InvalidInput { key: String, message: String },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("{0}")]
    Failed(String),
}

/// Typed access failures on `WorkflowState`.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state key '{0}' is not present")]
    Missing(String),

    #[error("state key '{key}' has an unexpected shape: {message}")]
    Type { key: String, message: String },
}

//! Error taxonomy shared by the generation client and the workshop.

use crate::core::state::{Stage, StageKind};
use thiserror::Error;

/// Failure observed at the generation boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Failure of a single workshop stage operation.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage} cannot run yet: {reason}")]
    PreconditionNotMet { stage: Stage, reason: String },

    #[error("{kind} is already running")]
    StageBusy { kind: StageKind },

    #[error("invalid input: {0}")]
    ValidationFailure(String),

    #[error("{stage} failed: {source}")]
    Generation {
        stage: Stage,
        #[source]
        source: GenerationError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PreconditionNotMet,
    StageBusy,
    TransportFailure,
    MalformedResponse,
    ValidationFailure,
}

impl StageError {
    pub fn precondition(stage: Stage, reason: impl Into<String>) -> Self {
        StageError::PreconditionNotMet {
            stage,
            reason: reason.into(),
        }
    }

    pub fn generation(stage: Stage, source: GenerationError) -> Self {
        match source {
            GenerationError::EmptyPrompt => {
                StageError::ValidationFailure(format!("{}: {}", stage, source))
            }
            source => StageError::Generation { stage, source },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::PreconditionNotMet { .. } => ErrorKind::PreconditionNotMet,
            StageError::StageBusy { .. } => ErrorKind::StageBusy,
            StageError::ValidationFailure(_) => ErrorKind::ValidationFailure,
            StageError::Generation { source, .. } => match source {
                GenerationError::TransportFailure(_) => ErrorKind::TransportFailure,
                GenerationError::MalformedResponse(_) => ErrorKind::MalformedResponse,
                GenerationError::EmptyPrompt => ErrorKind::ValidationFailure,
            },
        }
    }
}

//! Domain errors for conversation and feedback operations.

use crate::models::Phase;
use crate::services::gateway::ModelError;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedbackError {
    /// Caller input violates a precondition.
    #[error("{0}")]
    Validation(String),

    /// Operation not allowed in the session's current phase.
    #[error("{operation} is not allowed while the conversation is {phase}")]
    State { operation: &'static str, phase: Phase },

    #[error("Turn limit of {max_turns} reached; generate feedback to continue")]
    Boundary { max_turns: u32 },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Conversation {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Persistence(#[from] AppError),
}

impl From<FeedbackError> for AppError {
    fn from(err: FeedbackError) -> Self {
        match err {
            FeedbackError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            e @ FeedbackError::State { .. } => AppError::Conflict(anyhow::anyhow!(e.to_string())),
            e @ FeedbackError::Boundary { .. } => AppError::UnprocessableEntity(anyhow::anyhow!(e.to_string())),
            FeedbackError::Model(ModelError::RateLimited { .. }) => AppError::TooManyRequests(
                "The model is busy, please try again shortly".to_string(),
                Some(30),
            ),
            FeedbackError::Model(e) => AppError::BadGateway(e.to_string()),
            e @ FeedbackError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(e.to_string())),
            FeedbackError::Persistence(e) => e,
        }
    }
}

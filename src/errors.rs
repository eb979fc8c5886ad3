//! Typed error hierarchy for the job board.
//!
//! - `SyncError` — server-side dashboard operation failures
//! - `ClientError` — reconciliation controller failures

use jobboard_common::{BoardError, ValidationError};
use thiserror::Error;

use crate::client::transport::TransportError;

/// Failure of a dashboard operation on the server. Each variant maps to one
/// HTTP status class at the API boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Task {task_id} not found")]
    NotFound { task_id: String },

    #[error("Store failure: {0}")]
    Store(#[source] anyhow::Error),
}

impl SyncError {
    pub fn not_found(task_id: impl Into<String>) -> Self {
        Self::NotFound {
            task_id: task_id.into(),
        }
    }
}

/// Failure of a client gesture. Server-side failures of an already applied
/// gesture are not errors; they are reported through `SyncOutcome`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Gesture rejected by local board: {0}")]
    Board(#[from] BoardError),

    #[error("Task {0} is not confirmed by the server yet")]
    Unconfirmed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

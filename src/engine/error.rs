//! Error types for routing failures

use thiserror::Error;

use crate::scoring::ScoreError;

/// Errors that can occur while routing a task.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// No rule matched and no default destination is configured
    #[error("No destination found for task '{task_id}': no rule matched and no default destination is configured")]
    NoDestination { task_id: String },

    /// Decision confidence must lie in [0, 1]; anything else is a programming error
    #[error("Decision confidence {0} is outside [0.0, 1.0]")]
    InvalidConfidence(f64),

    /// Score aggregation failed
    #[error(transparent)]
    Score(#[from] ScoreError),
}

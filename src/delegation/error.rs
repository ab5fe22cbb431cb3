//! Error types for delegation failures

use thiserror::Error;

/// Errors raised by the delegation protocol.
#[derive(Debug, Error)]
pub enum DelegationError {
    /// The transition is not legal from the delegation's current status
    #[error("Delegation '{delegation_id}' cannot move from {from} to {to}")]
    IllegalTransition {
        delegation_id: String,
        from: String,
        to: String,
    },

    /// The target instance cannot receive delegations in its current status
    #[error("Instance '{instance_id}' is {status} and cannot accept delegations")]
    TargetNotAccepting {
        instance_id: String,
        status: String,
    },

    /// No instance with the given id exists
    #[error("Instance '{0}' not found")]
    InstanceNotFound(String),

    /// No delegation with the given id exists
    #[error("Delegation '{0}' not found")]
    DelegationNotFound(String),

    /// No task with the given id exists
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    /// The task already has a pending or accepted delegation
    #[error("Task '{task_id}' already has an active delegation '{delegation_id}'")]
    AlreadyDelegated {
        task_id: String,
        delegation_id: String,
    },
}

//! Delegation records and their lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a task is being handed to another instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DelegationType {
    /// Normal routing to a better-fit destination
    #[default]
    Route,
    /// Breaking the task into sub-work at a narrower scope
    Decompose,
    /// Pushing the task up the hierarchy
    Escalate,
    /// Moving the task sideways after a failed assignment
    Reassign,
}

impl std::fmt::Display for DelegationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DelegationType::Route => "route",
            DelegationType::Decompose => "decompose",
            DelegationType::Escalate => "escalate",
            DelegationType::Reassign => "reassign",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle status of a delegation.
///
/// `Pending` and `Accepted` are the only non-terminal states; a task may hold
/// at most one delegation in either at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationStatus {
    /// Created, target not yet confirmed
    Pending,
    /// Target confirmed custody
    Accepted,
    /// Target declined; custody returned to the source
    Rejected,
    /// Work finished
    Completed,
    /// Withdrawn before completion; custody returned to the source
    Cancelled,
}

impl DelegationStatus {
    /// Whether the delegation still represents in-flight custody.
    pub fn is_active(&self) -> bool {
        matches!(self, DelegationStatus::Pending | DelegationStatus::Accepted)
    }

    /// Whether `next` is a legal transition from this status.
    pub fn can_transition_to(&self, next: DelegationStatus) -> bool {
        use DelegationStatus::*;
        match self {
            Pending => matches!(next, Accepted | Rejected | Completed | Cancelled),
            Accepted => matches!(next, Completed | Cancelled),
            Rejected | Completed | Cancelled => false,
        }
    }
}

impl std::fmt::Display for DelegationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DelegationStatus::Pending => "pending",
            DelegationStatus::Accepted => "accepted",
            DelegationStatus::Rejected => "rejected",
            DelegationStatus::Completed => "completed",
            DelegationStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One custody hand-off of a task from a source instance to a target
/// instance, with its own lifecycle independent of the task's.
///
/// Delegations are never deleted; a task's ordered set of them forms its
/// delegation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: String,
    pub task_id: String,
    /// Instance that held the task when the delegation was created, if any
    pub source_instance_id: Option<String>,
    pub target_instance_id: String,
    #[serde(rename = "type")]
    pub delegation_type: DelegationType,
    pub status: DelegationStatus,
    /// Actor that initiated the hand-off, if known
    pub delegated_by: Option<String>,
    pub delegated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque outcome payload, set only on completion
    pub result: Option<serde_json::Value>,
    pub rejection_reason: Option<String>,
    /// Free-form notes accumulated across transitions
    pub notes: Vec<String>,
}

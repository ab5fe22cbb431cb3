use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Breadth of an instance in the destination hierarchy.
///
/// Scopes strictly narrow from the root down: a `Project` instance may only
/// hang off a `Global` parent, an `Orchestration` instance off a `Global` or
/// `Project` parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceScope {
    /// Root-level orchestrator
    Global,
    /// Project-level coordinator
    Project,
    /// Leaf-level executor (human team, agent, sub-orchestrator)
    Orchestration,
}

impl InstanceScope {
    /// Breadth rank (0 = widest). Children must have a strictly larger rank
    /// than their parent.
    pub fn rank(&self) -> u8 {
        match self {
            InstanceScope::Global => 0,
            InstanceScope::Project => 1,
            InstanceScope::Orchestration => 2,
        }
    }
}

impl FromStr for InstanceScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(InstanceScope::Global),
            "project" => Ok(InstanceScope::Project),
            "orchestration" => Ok(InstanceScope::Orchestration),
            _ => Err(format!("Unknown instance scope: {}", s)),
        }
    }
}

impl std::fmt::Display for InstanceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceScope::Global => write!(f, "global"),
            InstanceScope::Project => write!(f, "project"),
            InstanceScope::Orchestration => write!(f, "orchestration"),
        }
    }
}

/// Lifecycle status of an instance.
///
/// Only `Created` and `Running` instances accept new delegations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Registered but not yet started
    Created,
    /// Actively processing
    Running,
    /// Temporarily suspended
    Paused,
    /// Cleanly stopped
    Stopped,
    /// Permanently removed from service
    Terminated,
    /// Faulted
    Error,
}

impl InstanceStatus {
    /// Whether the instance can receive a new delegation.
    pub fn accepts_delegations(&self) -> bool {
        matches!(self, InstanceStatus::Created | InstanceStatus::Running)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstanceStatus::Created => "created",
            InstanceStatus::Running => "running",
            InstanceStatus::Paused => "paused",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Terminated => "terminated",
            InstanceStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A destination node in the hierarchy: a human team, an AI agent, or a
/// sub-orchestrator that can own tasks.
///
/// Ancestry (root, depth, ancestor chain) is derived by parent-pointer
/// traversal in the registry, never stored on the node itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Breadth in the hierarchy
    pub scope: InstanceScope,
    /// Parent instance id; `None` only at the root
    pub parent_id: Option<String>,
    /// Lifecycle status
    pub status: InstanceStatus,
    /// Capability labels used for routing
    pub capabilities: HashSet<String>,
    /// Number of tasks currently owned
    pub current_load: u32,
    /// Maximum concurrent tasks
    pub max_capacity: u32,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl Instance {
    /// Create a new instance in `Created` status with zero load.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        scope: InstanceScope,
        parent_id: Option<String>,
        capabilities: impl IntoIterator<Item = String>,
        max_capacity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scope,
            parent_id,
            status: InstanceStatus::Created,
            capabilities: capabilities.into_iter().collect(),
            current_load: 0,
            max_capacity,
            created_at: Utc::now(),
        }
    }

    /// Whether the instance has spare capacity for another task.
    pub fn has_capacity(&self) -> bool {
        self.current_load < self.max_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_rank_strictly_narrows() {
        assert!(InstanceScope::Global.rank() < InstanceScope::Project.rank());
        assert!(InstanceScope::Project.rank() < InstanceScope::Orchestration.rank());
    }

    #[test]
    fn scope_from_str() {
        assert_eq!(
            "global".parse::<InstanceScope>().unwrap(),
            InstanceScope::Global
        );
        assert_eq!(
            "ORCHESTRATION".parse::<InstanceScope>().unwrap(),
            InstanceScope::Orchestration
        );
        assert!("region".parse::<InstanceScope>().is_err());
    }

    #[test]
    fn created_and_running_accept_delegations() {
        assert!(InstanceStatus::Created.accepts_delegations());
        assert!(InstanceStatus::Running.accepts_delegations());
        assert!(!InstanceStatus::Paused.accepts_delegations());
        assert!(!InstanceStatus::Stopped.accepts_delegations());
        assert!(!InstanceStatus::Terminated.accepts_delegations());
        assert!(!InstanceStatus::Error.accepts_delegations());
    }

    #[test]
    fn capacity_check() {
        let mut instance = Instance::new(
            "i1",
            "Triage",
            InstanceScope::Orchestration,
            Some("root".to_string()),
            vec![],
            2,
        );
        assert!(instance.has_capacity());
        instance.current_load = 2;
        assert!(!instance.has_capacity());
    }
}

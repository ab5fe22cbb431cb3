//! The routing context: a per-task snapshot consumed by the scorer.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hierarchy::{Instance, InstanceScope, InstanceStatus};
use crate::task::{Task, TaskPriority};

/// A historically similar task and how its routing turned out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarTask {
    pub id: String,
    pub title: String,
    /// Similarity to the task being routed, in `[0.0, 1.0]`
    pub similarity: f64,
    /// Destination the similar task was routed to
    pub routed_to: String,
    /// Whether that routing worked out
    pub outcome_success: bool,
}

/// Point-in-time snapshot of a destination instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: String,
    pub name: String,
    pub scope: InstanceScope,
    pub status: InstanceStatus,
    pub capabilities: HashSet<String>,
    pub current_load: u32,
    pub max_capacity: u32,
}

impl From<&Instance> for InstanceInfo {
    fn from(instance: &Instance) -> Self {
        Self {
            id: instance.id.clone(),
            name: instance.name.clone(),
            scope: instance.scope,
            status: instance.status,
            capabilities: instance.capabilities.clone(),
            current_load: instance.current_load,
            max_capacity: instance.max_capacity,
        }
    }
}

/// A recently recorded routing decision, for neighborhood context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentDecision {
    pub decision_id: String,
    pub destination: String,
    pub confidence: f64,
    pub decided_at: DateTime<Utc>,
}

/// Ephemeral, per-task snapshot of everything the scorer needs: the task's
/// own attributes, similar historical tasks, the current destination tree,
/// and recent decisions.
///
/// Derived entirely from task/instance/decision state; never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingContext {
    pub task_id: String,
    pub task_title: String,
    pub task_description: String,
    pub task_tags: HashSet<String>,
    pub task_priority: TaskPriority,
    pub similar_tasks: Vec<SimilarTask>,
    pub instances: Vec<InstanceInfo>,
    pub recent_decisions: Vec<RecentDecision>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RoutingContext {
    /// Build a context directly from a task, without instance or history data.
    pub fn from_task(task: &Task, session_id: Option<String>) -> Self {
        Self {
            task_id: task.id.clone(),
            task_title: task.title.clone(),
            task_description: task.description.clone(),
            task_tags: task.tags.clone(),
            task_priority: task.priority,
            similar_tasks: Vec::new(),
            instances: Vec::new(),
            recent_decisions: Vec::new(),
            session_id,
            created_at: Utc::now(),
        }
    }

    /// Title and description joined for text matching.
    pub fn matchable_text(&self) -> String {
        format!("{} {}", self.task_title, self.task_description)
    }

    /// Similar tasks whose routing succeeded.
    pub fn successful_routings(&self) -> Vec<&SimilarTask> {
        self.similar_tasks
            .iter()
            .filter(|t| t.outcome_success)
            .collect()
    }

    /// Look up an instance snapshot by id.
    pub fn instance_by_id(&self, id: &str) -> Option<&InstanceInfo> {
        self.instances.iter().find(|i| i.id == id)
    }

    /// Instance snapshots with spare capacity.
    pub fn instances_with_capacity(&self) -> Vec<&InstanceInfo> {
        self.instances
            .iter()
            .filter(|i| i.current_load < i.max_capacity)
            .collect()
    }
}
